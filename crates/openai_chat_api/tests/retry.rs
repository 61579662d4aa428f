use openai_chat_api::retry::*;

#[test]
fn retry_http_status_is_retryable() {
    for status in [429, 500, 502, 503, 504] {
        assert!(is_retryable_http_error(status, ""), "status {status}");
    }
    assert!(!is_retryable_http_error(400, "bad request"));
    assert!(!is_retryable_http_error(401, "invalid api key"));
}

#[test]
fn retry_http_error_pattern_is_retryable() {
    assert!(is_retryable_http_error(400, "Rate limit reached for requests"));
    assert!(is_retryable_http_error(400, "The engine is currently overloaded"));
    assert!(is_retryable_http_error(418, "connection refused"));
}

#[test]
fn retry_delay_is_exponential() {
    assert_eq!(retry_delay(0).as_millis(), 1000);
    assert_eq!(retry_delay(1).as_millis(), 2000);
    assert_eq!(retry_delay(2).as_millis(), 4000);
    assert_eq!(MAX_RETRIES, 3);
}
