use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://opentdb.com/api.php";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("question request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("question request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("question api answered with response code {0}")]
    Api(u8),
    #[error("question body is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// A question as the trivia API sends it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TriviaQuestion {
    #[serde(deserialize_with = "base64_text")]
    pub category: String,
    #[serde(deserialize_with = "base64_text")]
    pub difficulty: String,
    #[serde(deserialize_with = "base64_text")]
    pub question: String,
    #[serde(deserialize_with = "base64_text")]
    pub correct_answer: String,
    #[serde(deserialize_with = "base64_texts")]
    pub incorrect_answers: Vec<String>,
}

/// Where the questions of a round come from.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn fetch(&self, amount: usize) -> Result<Vec<TriviaQuestion>, FetchError>;
}

/// Open Trivia DB client. Asks for multiple-choice questions only.
#[derive(Clone)]
pub struct OpenTdb {
    client: Client,
    api_url: String,
}

impl OpenTdb {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl QuestionSource for OpenTdb {
    async fn fetch(&self, amount: usize) -> Result<Vec<TriviaQuestion>, FetchError> {
        log::debug!("Requesting {} questions from {}", amount, self.api_url);
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("amount", amount.to_string()),
                ("type", "multiple".to_string()),
                // Plain text survives base64; the default html entities would not
                ("encode", "base64".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status()));
        }

        let body = response.text().await?;
        parse_response(&body)
    }
}

#[derive(Deserialize)]
struct TriviaResponse {
    response_code: u8,
    #[serde(default)]
    results: Vec<TriviaQuestion>,
}

pub fn parse_response(body: &str) -> Result<Vec<TriviaQuestion>, FetchError> {
    let response: TriviaResponse = serde_json::from_str(body)?;
    if response.response_code != 0 {
        return Err(FetchError::Api(response.response_code));
    }
    Ok(response.results)
}

fn decode<E: serde::de::Error>(encoded: &str) -> Result<String, E> {
    let bytes = STANDARD.decode(encoded).map_err(E::custom)?;
    String::from_utf8(bytes).map_err(E::custom)
}

fn base64_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    decode(&encoded)
}

fn base64_texts<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Vec::<String>::deserialize(deserializer)?
        .iter()
        .map(|encoded| decode(encoded))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(text: &str) -> String {
        STANDARD.encode(text)
    }

    fn body(response_code: u8) -> String {
        serde_json::json!({
            "response_code": response_code,
            "results": [{
                "type": encoded("multiple"),
                "difficulty": encoded("medium"),
                "category": encoded("History"),
                "question": encoded("Who wrote \"Kobzar\"?"),
                "correct_answer": encoded("Taras Shevchenko"),
                "incorrect_answers": [
                    encoded("Ivan Franko"),
                    encoded("Lesya Ukrainka"),
                    encoded("Mykola Gogol"),
                ],
            }],
        })
        .to_string()
    }

    #[test]
    fn decodes_base64_fields() {
        let questions = parse_response(&body(0)).unwrap();

        assert_eq!(questions.len(), 1);
        let question = &questions[0];
        assert_eq!(question.question, "Who wrote \"Kobzar\"?");
        assert_eq!(question.correct_answer, "Taras Shevchenko");
        assert_eq!(question.difficulty, "medium");
        assert_eq!(question.category, "History");
        assert_eq!(
            question.incorrect_answers,
            vec!["Ivan Franko", "Lesya Ukrainka", "Mykola Gogol"]
        );
    }

    #[test]
    fn non_zero_response_code_is_an_error() {
        let rate_limited = r#"{"response_code": 5, "results": []}"#;
        assert!(matches!(parse_response(rate_limited), Err(FetchError::Api(5))));
        assert!(matches!(parse_response(&body(1)), Err(FetchError::Api(1))));
    }

    #[test]
    fn html_body_is_an_error() {
        let page = "<html><body>Service Unavailable</body></html>";
        assert!(matches!(parse_response(page), Err(FetchError::Json(_))));
    }

    #[test]
    fn text_that_is_not_base64_is_an_error() {
        let plain = r#"{"response_code": 0, "results": [{
            "category": "History", "difficulty": "easy",
            "question": "Plain &quot;text&quot;?", "correct_answer": "Yes",
            "incorrect_answers": ["No"]
        }]}"#;
        assert!(matches!(parse_response(plain), Err(FetchError::Json(_))));
    }
}
