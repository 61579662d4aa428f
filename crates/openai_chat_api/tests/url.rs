use openai_chat_api::normalize_chat_completions_url;
use openai_chat_api::url::DEFAULT_OPENAI_BASE_URL;

#[test]
fn url_normalization_appends_chat_completions_to_base() {
    assert_eq!(
        normalize_chat_completions_url("https://api.openai.com/v1"),
        "https://api.openai.com/v1/chat/completions"
    );
}

#[test]
fn url_normalization_keeps_existing_endpoint_and_trailing_slashes() {
    assert_eq!(
        normalize_chat_completions_url("https://proxy.local/v1/chat/completions/"),
        "https://proxy.local/v1/chat/completions"
    );
    assert_eq!(
        normalize_chat_completions_url("http://127.0.0.1:8080/v1//"),
        "http://127.0.0.1:8080/v1/chat/completions"
    );
}

#[test]
fn url_normalization_defaults_blank_input() {
    assert_eq!(
        normalize_chat_completions_url("   "),
        format!("{DEFAULT_OPENAI_BASE_URL}/chat/completions")
    );
}
