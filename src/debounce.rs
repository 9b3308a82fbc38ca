use crate::db::Database;
use crate::errors::AppResult;
use crate::models::DocNode;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Coalesces rapid notebook body edits into the last write. Each queued save
/// owns an explicit timer task; queueing again for the same notebook aborts
/// and replaces it, so at most one save is pending per notebook per window.
pub struct BodySaveDebouncer {
    db: Arc<Database>,
    window: Duration,
    pending: Arc<tokio::sync::Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl BodySaveDebouncer {
    pub fn new(db: Arc<Database>, window: Duration) -> Self {
        Self {
            db,
            window,
            pending: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    pub async fn queue(&self, notebook_id: &str, body: DocNode) {
        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.remove(notebook_id) {
            previous.abort();
        }

        let db = self.db.clone();
        let id = notebook_id.to_string();
        let window = self.window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Err(error) = db.update_notebook_body(&id, &body) {
                tracing::warn!(notebook_id = %id, error = %error, "debounced body save failed");
            }
        });
        pending.insert(notebook_id.to_string(), handle);
    }

    /// Writes immediately, canceling any pending save for the notebook.
    pub async fn flush(&self, notebook_id: &str, body: &DocNode) -> AppResult<()> {
        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.remove(notebook_id) {
            previous.abort();
        }
        drop(pending);
        self.db.update_notebook_body(notebook_id, body)
    }
}

#[cfg(test)]
mod tests {
    use super::BodySaveDebouncer;
    use crate::db::Database;
    use crate::models::DocNode;
    use std::sync::Arc;
    use tokio::time::Duration;

    fn paragraph(text: &str) -> DocNode {
        DocNode {
            r#type: "doc".to_string(),
            attrs: None,
            content: Some(vec![DocNode {
                r#type: "paragraph".to_string(),
                attrs: None,
                content: Some(vec![DocNode {
                    r#type: "text".to_string(),
                    attrs: None,
                    content: None,
                    marks: None,
                    text: Some(text.to_string()),
                }]),
                marks: None,
                text: None,
            }]),
            marks: None,
            text: None,
        }
    }

    #[tokio::test]
    async fn rapid_edits_coalesce_into_the_last_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::new(&dir.path().join("test.db")).expect("db"));
        let notebook = db.create_notebook("Draft", None).expect("notebook");

        let debouncer = BodySaveDebouncer::new(db.clone(), Duration::from_millis(30));
        debouncer.queue(&notebook.id, paragraph("first")).await;
        debouncer.queue(&notebook.id, paragraph("second")).await;
        debouncer.queue(&notebook.id, paragraph("third")).await;

        tokio::time::sleep(Duration::from_millis(120)).await;

        let saved = db
            .get_notebook(&notebook.id)
            .expect("get")
            .expect("exists");
        assert_eq!(saved.body, Some(paragraph("third")));
    }

    #[tokio::test]
    async fn flush_writes_immediately_and_cancels_the_pending_save() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::new(&dir.path().join("test.db")).expect("db"));
        let notebook = db.create_notebook("Draft", None).expect("notebook");

        let debouncer = BodySaveDebouncer::new(db.clone(), Duration::from_millis(30));
        debouncer.queue(&notebook.id, paragraph("queued")).await;
        debouncer
            .flush(&notebook.id, &paragraph("flushed"))
            .await
            .expect("flush");

        tokio::time::sleep(Duration::from_millis(120)).await;

        let saved = db
            .get_notebook(&notebook.id)
            .expect("get")
            .expect("exists");
        assert_eq!(saved.body, Some(paragraph("flushed")));
    }
}
