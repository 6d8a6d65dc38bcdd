//! 改写服务 - 业务能力层
//!
//! 只负责"把一段文本改写成另一段文本"，不关心流程、并发和重试
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）
//!
//! 错误在这里统一分类为 Quota / Transient / Fatal，
//! 上层只根据分类决定重试或暂停。

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::CollaboratorError;

/// 表示配额耗尽的 API 错误码 / 类型
const QUOTA_CODES: &[&str] = &[
    "insufficient_quota",
    "rate_limit_exceeded",
    "resource_exhausted",
];

const PARAPHRASE_SYSTEM_PROMPT: &str = "You are an expert in academic and scientific writing. \
Paraphrase the text you are given while:\n\
1. Preserving the exact meaning and all key information\n\
2. Maintaining the academic/scientific style and terminology\n\
3. Ensuring the new version is significantly different from the original\n\
4. Keeping the same level of formality and technical precision\n\
Keep the language of the original text. \
Provide ONLY the paraphrased version, without any explanations or metadata.";

const HUMANIZE_SYSTEM_PROMPT: &str = "You are a final editor. Take the paraphrased text you are given \
and make subtle adjustments so that it reads naturally, while maintaining accuracy and academic style. \
Make minimal changes, only what is necessary to improve natural flow. \
Provide ONLY the refined version, without any explanations.";

/// 外部改写能力
#[async_trait]
pub trait Paraphraser: Send + Sync {
    /// 改写一段文本
    async fn paraphrase(&self, text: &str) -> Result<String, CollaboratorError>;
}

/// 基于 OpenAI 兼容接口的改写服务
///
/// 职责：
/// - 调用 LLM API 改写单个片段
/// - 可选的第二轮润色（失败时保留第一轮结果）
/// - 把 API 错误分类为 Quota / Transient / Fatal
/// - 不关心片段序号、任务和重试
pub struct OpenAiParaphraser {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    humanize: bool,
}

impl OpenAiParaphraser {
    /// 创建新的改写服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            timeout: config.llm_timeout(),
            humanize: config.humanize,
        }
    }

    /// 通用的 LLM 调用函数（带超时）
    async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: &str,
    ) -> Result<String, CollaboratorError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.chars().count());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()
            .map_err(|e| CollaboratorError::Fatal(format!("构建系统消息失败: {}", e)))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| CollaboratorError::Fatal(format!("构建用户消息失败: {}", e)))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| CollaboratorError::Fatal(format!("构建请求失败: {}", e)))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                warn!("LLM API 调用超时 ({:?})", self.timeout);
                CollaboratorError::Transient(format!("请求超时 ({:?})", self.timeout))
            })?
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                classify_error(&e)
            })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(CollaboratorError::Transient("LLM 返回内容为空".to_string()));
        }
        Ok(content)
    }
}

#[async_trait]
impl Paraphraser for OpenAiParaphraser {
    async fn paraphrase(&self, text: &str) -> Result<String, CollaboratorError> {
        let draft = self.send_to_llm(text, PARAPHRASE_SYSTEM_PROMPT).await?;
        if !self.humanize {
            return Ok(draft);
        }

        match self.send_to_llm(&draft, HUMANIZE_SYSTEM_PROMPT).await {
            Ok(refined) => Ok(refined),
            // 配额耗尽必须向上报告，否则批次不会暂停
            Err(e) if e.is_quota() => Err(e),
            Err(e) => {
                warn!("润色失败，使用第一轮结果: {}", e);
                Ok(draft)
            }
        }
    }
}

/// 把 API 错误分类为 Quota / Transient / Fatal
pub fn classify_error(error: &OpenAIError) -> CollaboratorError {
    match error {
        OpenAIError::ApiError(api) => {
            let code = api.code.as_deref().unwrap_or_default();
            let kind = api.r#type.as_deref().unwrap_or_default();
            if is_quota_code(code) || is_quota_code(kind) {
                CollaboratorError::Quota(api.message.clone())
            } else {
                CollaboratorError::Fatal(api.message.clone())
            }
        }
        OpenAIError::InvalidArgument(msg) => CollaboratorError::Fatal(msg.clone()),
        other => CollaboratorError::Transient(other.to_string()),
    }
}

fn is_quota_code(code: &str) -> bool {
    let code = code.to_ascii_lowercase();
    QUOTA_CODES.iter().any(|q| code == *q)
}
