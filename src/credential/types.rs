use serde::{Deserialize, Serialize};
use std::fmt;

/// 一组完整的 API 凭证（consumer key/secret + access token/secret）。
///
/// 四个字段全部相等才视为同一个凭证；加载后不可变。
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credential {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl Credential {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: access_token.into(),
            access_token_secret: access_token_secret.into(),
        }
    }

    /// 用于集合成员判断的指纹。
    ///
    /// 每个字段写成 `<字节长度>:<值>` 再用 `|` 连接：长度前缀保证编码是单射的，
    /// 即使密钥里本身含有分隔符也不会和其它凭证撞上。
    pub fn fingerprint(&self) -> String {
        let mut out = String::with_capacity(
            self.consumer_key.len()
                + self.consumer_secret.len()
                + self.access_token.len()
                + self.access_token_secret.len()
                + 32,
        );
        for (i, field) in self.fields().iter().enumerate() {
            if i > 0 {
                out.push('|');
            }
            out.push_str(&field.len().to_string());
            out.push(':');
            out.push_str(field);
        }
        out
    }

    /// 按 JSON 字段名返回第一个为空（或仅含空白）的字段。
    pub fn first_empty_field(&self) -> Option<&'static str> {
        const NAMES: [&str; 4] = [
            "consumer_key",
            "consumer_secret",
            "access_token",
            "access_token_secret",
        ];
        self.fields()
            .iter()
            .zip(NAMES)
            .find(|(v, _)| v.trim().is_empty())
            .map(|(_, name)| name)
    }

    /// 日志里使用的 consumer key（中间部分打码）。
    pub fn masked_key(&self) -> String {
        crate::logging::mask_secret(&self.consumer_key).into_owned()
    }

    fn fields(&self) -> [&str; 4] {
        [
            self.consumer_key.as_str(),
            self.consumer_secret.as_str(),
            self.access_token.as_str(),
            self.access_token_secret.as_str(),
        ]
    }
}

// 不打印任何 secret：Debug/Display 只输出打码后的 consumer key。
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("consumer_key", &self.masked_key())
            .field("consumer_secret", &"***")
            .field("access_token", &"***")
            .field("access_token_secret", &"***")
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer_key: {}", self.masked_key())
    }
}
