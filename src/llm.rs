use crate::config::{AnalysisConfig, Config, LLMConfig};
use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("max retries reached ({retries}), last error: {body}")]
    RateLimited { retries: u32, body: String },

    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("network error after {retries} retries: {source}")]
    Transport {
        retries: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl AnalysisError {
    /// Transient failures (rate limit, transport) that the client already retried before giving up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transport { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(model: &str, prompt: String) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        }
    }
}

/// Client for the chat-completions endpoint.
///
/// Rate limits (429) and transport failures are retried with linear backoff.
/// Any other status, and a 200 without `choices[0].message.content`, fails at once.
#[derive(Clone)]
pub struct AnalysisClient {
    config: LLMConfig,
    api_key: String,
    retry: AnalysisConfig,
    client: Client,
}

impl AnalysisClient {
    pub fn new(config: &Config) -> crate::Result<Self> {
        let api_key = config.require_api_key()?.to_string();

        let mut builder = Client::builder();
        if let Some(secs) = config.llm.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            config: config.llm.clone(),
            api_key,
            retry: config.analysis.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    pub async fn analyze(
        &self,
        content: &str,
        directory_name: &str,
    ) -> Result<String, AnalysisError> {
        let request = ChatRequest::new(&self.config.model, build_prompt(content));
        let url = self.endpoint();
        let mut attempt: u32 = 0;

        loop {
            debug!(
                directory = directory_name,
                attempt,
                prompt_chars = request.messages[0].content.chars().count(),
                "Sending request to {}",
                url
            );

            match self.send(&url, &request).await {
                Ok((StatusCode::OK, body)) => {
                    let report = extract_content(&body)?;
                    info!(
                        directory = directory_name,
                        "Received analysis, {} characters",
                        report.chars().count()
                    );
                    return Ok(report);
                }
                Ok((StatusCode::TOO_MANY_REQUESTS, body)) => {
                    if attempt >= self.retry.max_retries {
                        error!(directory = directory_name, "Rate limited, retries exhausted");
                        return Err(AnalysisError::RateLimited {
                            retries: self.retry.max_retries,
                            body,
                        });
                    }
                    let wait = self.retry.backoff(attempt + 1);
                    warn!(
                        directory = directory_name,
                        "Rate limited, retrying in {:?}", wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok((status, body)) => {
                    error!(directory = directory_name, status = status.as_u16(), "API error");
                    return Err(AnalysisError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) => {
                    if attempt >= self.retry.max_retries {
                        error!(directory = directory_name, "Network error, retries exhausted: {}", e);
                        return Err(AnalysisError::Transport {
                            retries: attempt,
                            source: e,
                        });
                    }
                    let wait = self.retry.backoff(attempt + 1);
                    warn!(
                        directory = directory_name,
                        "Network error: {}, retrying in {:?}", e, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }

            attempt += 1;
        }
    }

    async fn send(
        &self,
        url: &str,
        request: &ChatRequest,
    ) -> Result<(StatusCode, String), reqwest::Error> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.config.referer)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), "Response body: {}", body);
        Ok((status, body))
    }
}

fn extract_content(body: &str) -> Result<String, AnalysisError> {
    let response_json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| AnalysisError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    response_json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            AnalysisError::MalformedResponse(
                "missing choices[0].message.content".to_string(),
            )
        })
}

pub fn build_prompt(content: &str) -> String {
    format!(
        r#"请分析以下代码的结构和实现:
1. 功能概述
- 此代码的主要目标和用途是什么?
- 解决了什么具体业务/技术问题?
- 主要的输入输出是什么?

2. 架构设计
- 整体架构和模块划分
- 核心类/接口及其职责
- 关键的设计模式应用

3. 实现细节
- 主要函数的功能说明和实现逻辑
- 关键算法和数据结构
- 异常处理机制
- 性能相关的实现

4. 依赖分析
- 外部依赖项及其版本
- 模块间的依赖关系
- 关键的第三方库使用

5. 核心流程
- 主要业务流程的实现步骤
- 关键的控制流程
- 数据流转过程


分析内容:
{}
"#,
        content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::REQUIRED_SECTIONS;
    use mockito::{Matcher, Server};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    fn test_config(base_url: String, max_retries: u32) -> Config {
        let mut config = Config::default();
        config.llm.api_key = Some("test-key".to_string());
        config.llm.base_url = base_url;
        config.analysis.max_retries = max_retries;
        config.analysis.retry_delay_ms = 5;
        config
    }

    #[test]
    fn prompt_asks_for_every_required_section() {
        let prompt = build_prompt("### File: a.py");
        for section in REQUIRED_SECTIONS {
            assert!(prompt.contains(section));
        }
        assert!(prompt.trim_end().ends_with("### File: a.py"));
    }

    #[test]
    fn missing_api_key_fails_construction() {
        let config = Config::default();
        assert!(AnalysisClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn success_returns_first_choice_content() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_header("http-referer", "http://localhost:8000")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""model":"anthropic/claude-3.5-sonnet""#.to_string()),
                Matcher::Regex(r#""role":"user""#.to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"report body"}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = AnalysisClient::new(&test_config(server.url(), 3)).unwrap();
        let out = client.analyze("print(1)", ".").await.unwrap();

        mock.assert_async().await;
        assert_eq!(out, "report body");
    }

    #[tokio::test]
    async fn constant_rate_limit_makes_max_retries_plus_one_attempts() {
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        let recorded = arrivals.clone();

        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body_from_request(move |_| {
                recorded.lock().unwrap().push(Instant::now());
                b"slow down".to_vec()
            })
            .expect(4)
            .create_async()
            .await;

        let mut config = test_config(server.url(), 3);
        config.analysis.retry_delay_ms = 30;
        let client = AnalysisClient::new(&config).unwrap();
        let err = client.analyze("x", "src").await.unwrap_err();

        mock.assert_async().await;
        match err {
            AnalysisError::RateLimited { retries, body } => {
                assert_eq!(retries, 3);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other}"),
        }

        let arrivals = arrivals.lock().unwrap();
        let gaps: Vec<Duration> = arrivals.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 3);
        for (i, gap) in gaps.iter().enumerate() {
            let expected = config.analysis.backoff(i as u32 + 1);
            assert!(*gap >= expected, "gap {i} was {gap:?}, expected at least {expected:?}");
        }
        assert!(gaps[0] < gaps[1] && gaps[1] < gaps[2], "gaps not increasing: {gaps:?}");
    }

    #[tokio::test]
    async fn other_status_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;

        let client = AnalysisClient::new(&test_config(server.url(), 3)).unwrap();
        let err = client.analyze("x", "src").await.unwrap_err();

        mock.assert_async().await;
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "API error (HTTP 500): boom");
    }

    #[tokio::test]
    async fn malformed_success_fails_without_retry_then_recovers() {
        let mut server = Server::new_async().await;
        let malformed = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = AnalysisClient::new(&test_config(server.url(), 3)).unwrap();
        let first = client.analyze("x", "src").await;
        malformed.assert_async().await;
        assert!(matches!(first, Err(AnalysisError::MalformedResponse(_))));
        malformed.remove_async().await;

        let valid = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"ok"}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let second = client.analyze("x", "src").await;
        valid.assert_async().await;
        assert_eq!(second.unwrap(), "ok");
    }

    #[tokio::test]
    async fn non_json_success_is_malformed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let client = AnalysisClient::new(&test_config(server.url(), 1)).unwrap();
        let err = client.analyze("x", "src").await.unwrap_err();
        assert!(err.to_string().starts_with("malformed response: invalid JSON"));
    }

    #[tokio::test]
    async fn transport_failure_is_retried_then_reported() {
        // Nothing listens on port 9 of localhost, so every attempt fails to connect.
        let client = AnalysisClient::new(&test_config("http://127.0.0.1:9".to_string(), 2)).unwrap();
        let err = client.analyze("x", "src").await.unwrap_err();

        assert!(err.is_retryable());
        match err {
            AnalysisError::Transport { retries, .. } => assert_eq!(retries, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
