use crate::credential::types::Credential;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 凭证文件加载失败。启动阶段致命：不允许在只加载了一部分凭证的情况下继续服务。
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("读取凭证文件 {} 失败: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("解析凭证文件 {} 失败: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: sonic_rs::Error,
    },

    #[error("第 {index} 个凭证的字段 {field} 为空")]
    EmptyField { index: usize, field: &'static str },

    #[error("第 {index} 个凭证的 consumer_key 与之前的凭证重复: {consumer_key}")]
    DuplicateConsumerKey { index: usize, consumer_key: String },
}

/// 启动时加载的全部凭证，以及用于快速成员判断的指纹集合。
///
/// 进程生命周期内只读。
#[derive(Debug, Default)]
pub struct CredentialSet {
    credentials: Vec<Credential>,
    fingerprints: HashSet<String>,
}

impl CredentialSet {
    /// 校验并构建凭证集合（保持原始顺序）。
    pub fn from_credentials(credentials: Vec<Credential>) -> Result<Self, LoadError> {
        let mut fingerprints = HashSet::with_capacity(credentials.len());
        let mut seen_keys: HashSet<String> = HashSet::with_capacity(credentials.len());

        for (index, c) in credentials.iter().enumerate() {
            if let Some(field) = c.first_empty_field() {
                return Err(LoadError::EmptyField { index, field });
            }
            // 租赁池按 consumer_key 存放条目，重复会破坏“每个凭证至多出现一次”。
            if !seen_keys.insert(c.consumer_key.clone()) {
                return Err(LoadError::DuplicateConsumerKey {
                    index,
                    consumer_key: c.masked_key(),
                });
            }
            fingerprints.insert(c.fingerprint());
        }

        Ok(Self {
            credentials,
            fingerprints,
        })
    }

    /// 从字节解析（JSON 数组）。`path` 仅用于错误信息。
    pub fn from_slice(path: &Path, data: &[u8]) -> Result<Self, LoadError> {
        let credentials: Vec<Credential> =
            sonic_rs::from_slice(data).map_err(|source| LoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_credentials(credentials)
    }

    /// 读取并校验凭证文件。每个进程只应调用一次，且必须在租赁开始之前。
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        let data = tokio::fs::read(&path).await.map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;

        Self::from_slice(&path, &data)
    }

    /// 是否为启动时配置过的凭证（四个字段完全一致）。
    pub fn contains(&self, credential: &Credential) -> bool {
        self.fingerprints.contains(&credential.fingerprint())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}
