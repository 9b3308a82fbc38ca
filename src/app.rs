use crate::ai::{prompts, ChatTurn, CompletionClient};
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{
    ChatContext, Conversation, CreateNotebookPayload, CreateSparkPayload, DocNode, EnhanceRequest,
    EnhanceResult, Message, MessageRole, Notebook, NotebookReference, NotebookWithRelations,
    SparkHead, SparkRouting, SparkVersion, SparkWithMeta,
};
use std::path::Path;
use std::sync::Arc;

const CHAT_MAX_TOKENS: u32 = 1500;
const ENHANCE_MAX_TOKENS: u32 = 2000;

/// The operation surface the UI layer calls. Validates inputs before any
/// store call, orchestrates the store and the completion service, and owns
/// no state beyond its handles — every read is served fresh from the store.
#[derive(Clone)]
pub struct AppCore {
    db: Arc<Database>,
    completion: Arc<dyn CompletionClient>,
}

impl AppCore {
    pub fn new(app_data_dir: &Path, completion: Arc<dyn CompletionClient>) -> AppResult<Arc<Self>> {
        let db_path = app_data_dir.join("state.sqlite");
        let db = Arc::new(Database::new(&db_path)?);
        let this = Arc::new(Self { db, completion });

        match this.db.prune_expired_conversations() {
            Ok(0) => {}
            Ok(removed) => {
                tracing::info!(count = removed, "pruned expired unsaved conversations on startup");
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to prune expired conversations on startup");
            }
        }

        Ok(this)
    }

    pub fn database(&self) -> Arc<Database> {
        self.db.clone()
    }

    // ─── Sparks ───────────────────────────────────────────────────────────────

    pub fn create_spark(&self, payload: CreateSparkPayload) -> AppResult<SparkWithMeta> {
        ensure_non_empty(&payload.content, "spark content")?;
        if let Some(title) = payload.title.as_deref() {
            ensure_non_empty(title, "spark title")?;
        }
        let spark = self.db.create_spark(
            &payload.content,
            payload.title.as_deref(),
            payload.notebook_id.as_deref(),
        )?;
        tracing::info!(root_id = %spark.root_id, routed = spark.notebook_id.is_some(), "created spark");
        Ok(spark)
    }

    pub fn edit_spark(&self, root_id: &str, content: &str) -> AppResult<SparkWithMeta> {
        ensure_non_empty(content, "spark content")?;
        self.db.edit_spark(root_id, content)
    }

    pub fn set_spark_title(&self, root_id: &str, title: &str) -> AppResult<()> {
        ensure_non_empty(title, "spark title")?;
        self.db.set_spark_title(root_id, title)
    }

    pub fn route_spark(&self, root_id: &str, notebook_id: &str) -> AppResult<()> {
        self.db.route_spark(root_id, notebook_id)
    }

    pub fn unroute_spark(&self, root_id: &str) -> AppResult<()> {
        self.db.unroute_spark(root_id)
    }

    pub fn delete_spark(&self, root_id: &str) -> AppResult<()> {
        self.db.delete_spark(root_id)?;
        tracing::info!(%root_id, "deleted spark lineage");
        Ok(())
    }

    pub fn spark_history(&self, root_id: &str) -> AppResult<Vec<SparkVersion>> {
        self.db.spark_history(root_id)
    }

    pub fn get_spark_head(&self, root_id: &str) -> AppResult<SparkHead> {
        self.db.get_spark_head(root_id)
    }

    pub fn get_routing(&self, root_id: &str) -> AppResult<Option<SparkRouting>> {
        self.db.get_routing(root_id)
    }

    pub fn all_sparks(&self) -> AppResult<Vec<SparkWithMeta>> {
        self.db.all_sparks_with_meta()
    }

    pub fn unrouted_sparks(&self) -> AppResult<Vec<SparkWithMeta>> {
        self.db.unrouted_sparks()
    }

    pub fn sparks_for_notebook(&self, notebook_id: &str) -> AppResult<Vec<SparkWithMeta>> {
        self.db.sparks_for_notebook(notebook_id)
    }

    // ─── Notebooks ────────────────────────────────────────────────────────────

    pub fn create_notebook(&self, payload: CreateNotebookPayload) -> AppResult<Notebook> {
        ensure_non_empty(&payload.name, "notebook name")?;
        let notebook = self
            .db
            .create_notebook(&payload.name, payload.parent_notebook_id.as_deref())?;
        tracing::info!(notebook_id = %notebook.id, "created notebook");
        Ok(notebook)
    }

    pub fn get_notebook(&self, id: &str) -> AppResult<Notebook> {
        self.db
            .get_notebook(id)?
            .ok_or_else(|| AppError::NotFound(format!("Notebook {id} not found")))
    }

    pub fn rename_notebook(&self, id: &str, name: &str) -> AppResult<()> {
        ensure_non_empty(name, "notebook name")?;
        self.db.rename_notebook(id, name)
    }

    pub fn update_notebook_body(&self, id: &str, body: &DocNode) -> AppResult<()> {
        self.db.update_notebook_body(id, body)
    }

    pub fn delete_notebook(&self, id: &str) -> AppResult<()> {
        self.db.delete_notebook(id)?;
        tracing::info!(notebook_id = %id, "deleted notebook");
        Ok(())
    }

    pub fn notebook_tree(&self) -> AppResult<Vec<Notebook>> {
        self.db.notebook_tree()
    }

    pub fn notebook_with_relations(&self, id: &str) -> AppResult<NotebookWithRelations> {
        self.db
            .notebook_with_relations(id)?
            .ok_or_else(|| AppError::NotFound(format!("Notebook {id} not found")))
    }

    pub fn add_reference(&self, notebook_id: &str, referenced_id: &str) -> AppResult<NotebookReference> {
        self.db.add_reference(notebook_id, referenced_id)
    }

    pub fn remove_reference(&self, notebook_id: &str, referenced_id: &str) -> AppResult<()> {
        self.db.remove_reference(notebook_id, referenced_id)
    }

    // ─── Conversations / AI ───────────────────────────────────────────────────

    pub fn active_conversation(&self, notebook_id: &str) -> AppResult<Conversation> {
        self.db.active_conversation(notebook_id)
    }

    pub fn create_conversation(&self, notebook_id: &str) -> AppResult<Conversation> {
        self.db.create_conversation(notebook_id)
    }

    pub fn conversations_for_notebook(&self, notebook_id: &str) -> AppResult<Vec<Conversation>> {
        self.db.conversations_for_notebook(notebook_id)
    }

    pub fn save_conversation(&self, id: &str) -> AppResult<()> {
        self.db.save_conversation(id)
    }

    pub fn delete_conversation(&self, id: &str) -> AppResult<()> {
        self.db.delete_conversation(id)
    }

    pub fn prune_expired_conversations(&self) -> AppResult<u64> {
        self.db.prune_expired_conversations()
    }

    /// Persists the user turn, asks the completion service for a reply
    /// grounded in the notebook context, and persists the assistant turn.
    /// An upstream failure surfaces as an error; the user turn stays
    /// persisted and no assistant turn is written.
    pub async fn send_chat_message(
        &self,
        conversation_id: &str,
        content: &str,
        context: &ChatContext,
    ) -> AppResult<Message> {
        ensure_non_empty(content, "message content")?;
        let conversation = self
            .db
            .get_conversation(conversation_id)?
            .ok_or_else(|| AppError::NotFound(format!("Conversation {conversation_id} not found")))?;

        let user_message = self
            .db
            .insert_message(conversation_id, MessageRole::User, content)?;
        self.db
            .touch_conversation(conversation_id, user_message.created_at)?;

        let system_prompt = prompts::build_chat_prompt(context);
        let mut turns: Vec<ChatTurn> = conversation.messages.iter().map(ChatTurn::from).collect();
        turns.push(ChatTurn::from(&user_message));

        let reply = self
            .completion
            .complete(&system_prompt, &turns, CHAT_MAX_TOKENS)
            .await?;
        let assistant_message =
            self.db
                .insert_message(conversation_id, MessageRole::Assistant, &reply)?;
        tracing::debug!(%conversation_id, "chat turn completed");
        Ok(assistant_message)
    }

    /// Returns the rewritten selection, or newly generated content when no
    /// selection was given, together with the original text for diffing.
    pub async fn enhance(&self, request: &EnhanceRequest) -> AppResult<EnhanceResult> {
        ensure_non_empty(&request.user_request, "enhancement request")?;
        let system_prompt = prompts::build_enhance_prompt(request);
        let turns = [ChatTurn {
            role: MessageRole::User,
            content: request.user_request.clone(),
        }];
        let suggestion = self
            .completion
            .complete(&system_prompt, &turns, ENHANCE_MAX_TOKENS)
            .await?;
        Ok(EnhanceResult {
            suggestion,
            original_text: request.selected_text.clone(),
        })
    }
}

fn ensure_non_empty(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::AppCore;
    use crate::ai::{ChatTurn, CompletionClient, CompletionFuture};
    use crate::errors::AppError;
    use crate::models::{ChatContext, CreateSparkPayload, EnhanceRequest, MessageRole};
    use std::sync::Arc;

    struct ScriptedCompletion {
        reply: Option<String>,
    }

    impl CompletionClient for ScriptedCompletion {
        fn complete(&self, _system_prompt: &str, _turns: &[ChatTurn], _max_tokens: u32) -> CompletionFuture {
            let reply = self.reply.clone();
            Box::pin(async move {
                match reply {
                    Some(content) => Ok(content),
                    None => Err(AppError::Upstream("completion unavailable".to_string())),
                }
            })
        }
    }

    fn core_with(reply: Option<&str>, dir: &tempfile::TempDir) -> Arc<AppCore> {
        AppCore::new(
            dir.path(),
            Arc::new(ScriptedCompletion {
                reply: reply.map(ToString::to_string),
            }),
        )
        .expect("core")
    }

    #[test]
    fn blank_spark_content_is_rejected_before_any_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = core_with(None, &dir);

        let err = core
            .create_spark(CreateSparkPayload {
                content: "   \n".to_string(),
                title: None,
                notebook_id: None,
            })
            .expect_err("blank content must fail");
        assert!(matches!(err, AppError::Validation(_)));
        assert!(core.all_sparks().expect("list").is_empty());
    }

    #[test]
    fn blank_title_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = core_with(None, &dir);

        let err = core
            .create_spark(CreateSparkPayload {
                content: "idea".to_string(),
                title: Some("  ".to_string()),
                notebook_id: None,
            })
            .expect_err("blank title must fail");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn chat_persists_user_and_assistant_turns_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = core_with(Some("an insight"), &dir);

        let notebook = core
            .create_notebook(crate::models::CreateNotebookPayload {
                name: "Ideas".to_string(),
                parent_notebook_id: None,
            })
            .expect("notebook");
        let conversation = core.active_conversation(&notebook.id).expect("conversation");

        let context = ChatContext {
            notebook_name: notebook.name.clone(),
            notebook_body: None,
            selected_text: None,
        };
        let reply = core
            .send_chat_message(&conversation.id, "what do you think?", &context)
            .await
            .expect("chat");
        assert_eq!(reply.role, MessageRole::Assistant);
        assert_eq!(reply.content, "an insight");

        let reloaded = core.active_conversation(&notebook.id).expect("reload");
        assert_eq!(reloaded.id, conversation.id);
        assert_eq!(reloaded.messages.len(), 2);
        assert_eq!(reloaded.messages[0].role, MessageRole::User);
        assert_eq!(reloaded.messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn chat_failure_keeps_user_turn_and_writes_no_assistant_turn() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = core_with(None, &dir);

        let notebook = core
            .create_notebook(crate::models::CreateNotebookPayload {
                name: "Ideas".to_string(),
                parent_notebook_id: None,
            })
            .expect("notebook");
        let conversation = core.active_conversation(&notebook.id).expect("conversation");

        let context = ChatContext {
            notebook_name: notebook.name.clone(),
            notebook_body: None,
            selected_text: None,
        };
        let err = core
            .send_chat_message(&conversation.id, "hello?", &context)
            .await
            .expect_err("must surface upstream failure");
        assert!(matches!(err, AppError::Upstream(_)));

        let reloaded = core.active_conversation(&notebook.id).expect("reload");
        assert_eq!(reloaded.messages.len(), 1);
        assert_eq!(reloaded.messages[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn enhance_returns_suggestion_with_original_selection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = core_with(Some("a sharper passage"), &dir);

        let result = core
            .enhance(&EnhanceRequest {
                notebook_name: "Draft".to_string(),
                notebook_body: None,
                selected_text: Some("a rough passage".to_string()),
                user_request: "tighten".to_string(),
            })
            .await
            .expect("enhance");
        assert_eq!(result.suggestion, "a sharper passage");
        assert_eq!(result.original_text.as_deref(), Some("a rough passage"));
    }
}
