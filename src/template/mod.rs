use crate::core::{ChatMessage, Role};

pub const IM_START: &str = "<|im_start|>";
pub const IM_END: &str = "<|im_end|>";
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// Renders messages in the ChatML layout used by Qwen checkpoints and opens
/// the assistant turn for generation.
pub fn chat_template(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();

    for msg in messages {
        prompt.push_str(IM_START);
        prompt.push_str(msg.role.as_str());
        prompt.push('\n');
        prompt.push_str(&msg.content);
        prompt.push_str(IM_END);
        prompt.push('\n');
    }

    prompt.push_str(IM_START);
    prompt.push_str(Role::Assistant.as_str());
    prompt.push('\n');
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_template() {
        let messages = vec![
            ChatMessage::system("You are a counselor."),
            ChatMessage::user("I can't sleep."),
        ];
        assert_eq!(
            chat_template(&messages),
            "<|im_start|>system\nYou are a counselor.<|im_end|>\n\
             <|im_start|>user\nI can't sleep.<|im_end|>\n\
             <|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_empty_messages_still_open_assistant_turn() {
        assert_eq!(chat_template(&[]), "<|im_start|>assistant\n");
    }
}
