use crate::models::{ChatContext, EnhanceRequest};

/// System prompt for notebook chat. A non-empty text selection takes
/// precedence over the full serialized body as grounding context.
pub fn build_chat_prompt(context: &ChatContext) -> String {
    let mut parts = vec![
        format!(
            "You are an AI assistant helping the user think through and develop ideas in their notebook titled \"{}\".",
            context.notebook_name
        ),
        "Be concise, insightful, and help the user deepen their thinking.".to_string(),
    ];

    if let Some(selected) = non_empty(context.selected_text.as_deref()) {
        parts.push(format!(
            "\nThe user has selected the following text to focus on:\n---\n{selected}\n---"
        ));
    } else if let Some(body) = non_empty(context.notebook_body.as_deref()) {
        parts.push(format!(
            "\nHere is the current content of the notebook:\n---\n{body}\n---"
        ));
    }

    parts.join("\n")
}

/// System prompt for the enhance operation: rewrite the selected passage, or
/// generate new content grounded in the full body when nothing is selected.
pub fn build_enhance_prompt(request: &EnhanceRequest) -> String {
    let mut parts = vec![
        format!(
            "You are an AI writing assistant helping improve a notebook titled \"{}\".",
            request.notebook_name
        ),
        "Provide only the enhanced/suggested text without any preamble or explanation.".to_string(),
        "Match the tone and style of the existing content.".to_string(),
    ];

    if let Some(selected) = non_empty(request.selected_text.as_deref()) {
        parts.push(format!(
            "\nThe user wants you to enhance this specific passage:\n---\n{selected}\n---"
        ));
        parts.push("\nReturn only the improved version of the selected text.".to_string());
    } else if let Some(body) = non_empty(request.notebook_body.as_deref()) {
        parts.push(format!(
            "\nHere is the current notebook content for context:\n---\n{body}\n---"
        ));
        parts.push("\nGenerate new content to add to the notebook based on the user's request.".to_string());
    }

    parts.join("\n")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{build_chat_prompt, build_enhance_prompt};
    use crate::models::{ChatContext, EnhanceRequest};

    #[test]
    fn chat_prompt_prefers_selection_over_body() {
        let prompt = build_chat_prompt(&ChatContext {
            notebook_name: "Ideas".to_string(),
            notebook_body: Some("the whole body".to_string()),
            selected_text: Some("just this bit".to_string()),
        });
        assert!(prompt.contains("notebook titled \"Ideas\""));
        assert!(prompt.contains("just this bit"));
        assert!(!prompt.contains("the whole body"));
    }

    #[test]
    fn chat_prompt_falls_back_to_body_when_selection_is_empty() {
        let prompt = build_chat_prompt(&ChatContext {
            notebook_name: "Ideas".to_string(),
            notebook_body: Some("the whole body".to_string()),
            selected_text: Some(String::new()),
        });
        assert!(prompt.contains("the whole body"));
    }

    #[test]
    fn enhance_prompt_with_selection_instructs_rewrite_only() {
        let prompt = build_enhance_prompt(&EnhanceRequest {
            notebook_name: "Draft".to_string(),
            notebook_body: Some("full draft".to_string()),
            selected_text: Some("rough passage".to_string()),
            user_request: "tighten this".to_string(),
        });
        assert!(prompt.contains("rough passage"));
        assert!(prompt.contains("Return only the improved version of the selected text."));
        assert!(!prompt.contains("full draft"));
    }

    #[test]
    fn enhance_prompt_without_selection_instructs_new_content() {
        let prompt = build_enhance_prompt(&EnhanceRequest {
            notebook_name: "Draft".to_string(),
            notebook_body: Some("full draft".to_string()),
            selected_text: None,
            user_request: "add a conclusion".to_string(),
        });
        assert!(prompt.contains("full draft"));
        assert!(prompt.contains("Generate new content to add to the notebook"));
    }
}
