use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum RewriteError {
    /// 前置条件校验失败（不会产生任何文档副作用）
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 任务 / 会话 / 文档不存在
    #[error("未找到: {0}")]
    NotFound(String),
    /// 外部改写服务错误
    #[error("改写服务错误: {0}")]
    Collaborator(#[from] CollaboratorError),
    /// 文档替换错误（结构化替换与纯文本兜底都失败）
    #[error("替换错误: {0}")]
    Replace(#[from] ReplaceError),
    /// 持久化错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 并发闸门已关闭
    #[error("并发闸门已关闭")]
    GateClosed(#[from] tokio::sync::AcquireError),
}

/// 校验错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// 原文片段与改写片段数量不一致
    #[error("原文片段数量 {originals} 与改写片段数量 {paraphrased} 不一致")]
    LengthMismatch { originals: usize, paraphrased: usize },
    /// 改写槽位已写入（每个槽位只允许写一次）
    #[error("槽位 {index} 已写入，不允许覆盖")]
    SlotAlreadyFilled { index: usize },
    /// 槽位索引超出范围
    #[error("槽位索引 {index} 超出范围 [0, {len})")]
    SlotOutOfRange { index: usize, len: usize },
    /// 当前任务状态不允许该操作
    #[error("任务 {task_id} 处于 {status} 状态，不允许 {operation}")]
    InvalidState {
        task_id: String,
        status: String,
        operation: String,
    },
    /// 没有可处理的片段
    #[error("任务 {task_id} 没有任何片段")]
    NoFragments { task_id: String },
}

/// 外部改写服务错误
///
/// 在适配器边界统一分类，核心流程只认这三种
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// 配额耗尽：本批次立即停止派发，任务进入 QuotaPaused，不重试
    #[error("配额耗尽: {0}")]
    Quota(String),
    /// 暂时性错误：按指数退避重试
    #[error("暂时性错误: {0}")]
    Transient(String),
    /// 不可恢复错误：不重试
    #[error("不可恢复错误: {0}")]
    Fatal(String),
}

impl CollaboratorError {
    /// 是否属于配额耗尽
    pub fn is_quota(&self) -> bool {
        matches!(self, CollaboratorError::Quota(_))
    }

    /// 是否值得重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, CollaboratorError::Transient(_))
    }
}

/// 结构化替换错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplaceError {
    /// 区间非法（越界 / 非字符边界 / 空区间）
    #[error("替换区间 [{start}, {end}) 非法 (文本长度: {len})")]
    InvalidSpan { start: usize, end: usize, len: usize },
    /// 区间跨越的段落不存在
    #[error("段落索引 {index} 不存在 (共 {len} 个段落)")]
    BlockOutOfRange { index: usize, len: usize },
    /// 结构化替换失败后，纯文本兜底也找不到原文
    #[error("纯文本兜底替换失败: 段落中不包含原文")]
    FallbackFailed,
}

/// 单个格式属性复制失败（只记录，不中断替换）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormattingCopyError {
    #[error("颜色值非法: {0}")]
    InvalidColor(String),
    #[error("字号非法: {0}")]
    InvalidSize(String),
    #[error("高亮颜色非法: {0}")]
    InvalidHighlight(String),
    #[error("字体名为空")]
    EmptyFontFamily,
}

/// 持久化错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 读写文件失败
    #[error("文件操作失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 序列化 / 反序列化失败
    #[error("JSON 处理失败 ({path}): {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// 引用不存在
    #[error("引用不存在: {0}")]
    MissingRef(String),
}

/// 配置错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// 配置值非法
    #[error("配置项 {field} 的值 {value} 非法: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

// ========== 便捷构造函数 ==========

impl StorageError {
    /// 创建文件操作错误
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// 创建 JSON 错误
    pub fn json(path: impl Into<String>, source: serde_json::Error) -> Self {
        StorageError::Json {
            path: path.into(),
            source,
        }
    }
}

impl RewriteError {
    /// 创建“未找到”错误
    pub fn not_found(what: impl Into<String>) -> Self {
        RewriteError::NotFound(what.into())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type Result<T> = std::result::Result<T, RewriteError>;
