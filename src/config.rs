use figment::Figment;
use figment::providers::Env;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 7777;
const DEFAULT_KEYS_FILE: &str = "./accounts.json";
const DEFAULT_DEBUG: &str = "low";

pub const DEFAULT_SERVICES: [&str; 6] = [
    "search/tweets",
    "statuses/user_timeline",
    "statuses/lookup",
    "users/lookup",
    "followers/ids",
    "friends/ids",
];

pub const USAGE: &str = r#"==========================================================================================
REST API keys provider.
Make JSON file with accounts, for example /path/to/accounts.json:
	[
		{
			"consumer_key": "your-consumer-key",
			"consumer_secret" : "your-consumer-secret",
			"access_token": "your-access-token",
			"access_token_secret": "your-access-secret"
		},
		{
			... another key ...
		}
	]

Start application with flags "port" and "keys_file", for example:
	keylease --port 7777 --keys_file /path/to/accounts.json

Environment (or .env): HOST, PORT, KEYS_FILE, SERVICES (comma separated), DEBUG (off/low/medium/high)

Get key example:
	GET http://localhost:7777/get?service=search/tweets

Set key example:
	POST http://localhost:7777/set?service=search/tweets
	Form fields:
	- consumer_key string (required)
	- consumer_secret string (required)
	- access_token string (required)
	- access_token_secret string (required)
	- remaining int (current rate limit, optional but useful for next usage)
	- reset int (next rate limit reset UNIX time, optional but useful for next usage)
"#;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub keys_file: PathBuf,
    pub services: Vec<String>,
    pub debug: String,
    /// 命令行带了 -h/--help。
    pub show_help: bool,
    /// 加载过程中被忽略的配置项；日志初始化之后再输出。
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
struct RawEnv {
    host: Option<String>,
    port: Option<String>,
    keys_file: Option<String>,
    services: Option<String>,
    debug: Option<String>,
    /// 无法读取的环境变量（只跳过出错的那一项）。
    warnings: Vec<String>,
}

/// figment 会把 `3`、`true` 之类的环境变量值解析成数字/布尔，这里统一还原成字符串。
#[derive(Deserialize)]
#[serde(untagged)]
enum EnvScalar {
    Str(String),
    UInt(u64),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl EnvScalar {
    fn into_string(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::UInt(n) => n.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

impl RawEnv {
    /// 逐项读取：某个变量格式不对时记一条警告，其余变量照常生效。
    fn from_figment(figment: &Figment) -> Self {
        let mut warnings = Vec::new();
        let mut field = |key: &str| -> Option<String> {
            if !figment.contains(key) {
                return None;
            }
            match figment.extract_inner::<EnvScalar>(key) {
                Ok(v) => Some(v.into_string()),
                Err(e) => {
                    warnings.push(format!("忽略无法解析的环境变量 {}: {e}", key.to_uppercase()));
                    None
                }
            }
        };

        let host = field("host");
        let port = field("port");
        let keys_file = field("keys_file");
        let services = field("services");
        let debug = field("debug");

        Self {
            host,
            port,
            keys_file,
            services,
            debug,
            warnings,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        load_dotenv();

        let raw = RawEnv::from_figment(&Figment::from(Env::raw()));

        let mut cfg = Self::from_raw(raw);
        cfg.apply_args(std::env::args().skip(1));
        cfg
    }

    fn from_raw(raw: RawEnv) -> Self {
        let mut warnings = raw.warnings;
        let port = match raw.port.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_PORT,
            Some(v) => v.parse::<u16>().unwrap_or_else(|_| {
                warnings.push(format!("忽略无效的 PORT: {v}"));
                DEFAULT_PORT
            }),
        };
        let services = raw
            .services
            .as_deref()
            .map(|v| parse_services(v, &mut warnings))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect());

        Self {
            host: raw.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            keys_file: PathBuf::from(raw.keys_file.unwrap_or_else(|| DEFAULT_KEYS_FILE.to_string())),
            services,
            debug: raw.debug.unwrap_or_else(|| DEFAULT_DEBUG.to_string()),
            show_help: false,
            warnings,
        }
    }

    /// 命令行覆盖：-port/--port、-keys_file/--keys_file、-debug/--debug，支持 `--flag=value`。
    fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let (name, inline) = match arg.split_once('=') {
                Some((n, v)) => (n.to_string(), Some(v.to_string())),
                None => (arg.clone(), None),
            };
            let name = name.trim_start_matches('-');

            match name {
                "h" | "help" => self.show_help = true,
                "port" | "keys_file" | "debug" => {
                    let Some(value) = inline.or_else(|| args.next()) else {
                        continue;
                    };
                    match name {
                        "port" => match value.trim().parse::<u16>() {
                            Ok(p) => self.port = p,
                            Err(_) => self.warnings.push(format!("忽略无效的端口参数: {value}")),
                        },
                        "keys_file" => self.keys_file = PathBuf::from(value),
                        _ => self.debug = value,
                    }
                }
                _ => {}
            }
        }
    }

    pub fn log_level(&self) -> crate::logging::LogLevel {
        crate::logging::LogLevel::parse(&self.debug)
    }
}

/// 逗号分隔的 service 列表：去空白、去空项、去重（保持顺序），只接受 `[a-z/]+`。
fn parse_services(value: &str, warnings: &mut Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in value.split(',') {
        let s = part.trim();
        if s.is_empty() {
            continue;
        }
        if !is_valid_service_name(s) {
            warnings.push(format!("忽略无效的 service 名称: {s}"));
            continue;
        }
        if !out.iter().any(|e| e == s) {
            out.push(s.to_string());
        }
    }
    out
}

pub fn is_valid_service_name(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_lowercase() || b == b'/')
}

fn load_dotenv() {
    let Some(dotenv_path) = find_dotenv_path() else {
        return;
    };

    let Ok(file) = std::fs::File::open(&dotenv_path) else {
        return;
    };

    let reader = std::io::BufReader::new(file);
    for line in std::io::BufRead::lines(reader).map_while(Result::ok) {
        let Some((key, value)) = parse_dotenv_line(&line) else {
            continue;
        };
        // 已显式设置的环境变量优先于 .env。
        if std::env::var_os(&key).is_some() {
            continue;
        }
        // Rust 2024：修改进程环境变量在并发场景下可能触发 UB，因此 API 为 unsafe。
        // 这里在启动阶段加载 .env，尚未启动任何其它线程。
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

fn find_dotenv_path() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let mut dir: &Path = cwd.as_path();

    loop {
        let candidate = dir.join(".env");
        if candidate.is_file() {
            return Some(candidate);
        }

        // 避免跨越仓库根目录：发现 Cargo.toml 或 .git 即停止向上寻找。
        if dir.join("Cargo.toml").is_file() || dir.join(".git").is_dir() {
            return None;
        }

        let parent = dir.parent()?;
        if parent == dir {
            return None;
        }
        dir = parent;
    }
}

fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let mut line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    if let Some(rest) = line.strip_prefix("export ") {
        line = rest.trim_start();
    }

    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let raw = raw.trim();
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return Some((key.to_string(), raw[1..raw.len() - 1].to_string()));
        }
    }

    Some((key.to_string(), strip_inline_comment(raw).to_string()))
}

fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] != b'#' {
            continue;
        }
        if i == 0 || bytes[i - 1] == b' ' || bytes[i - 1] == b'\t' {
            return value[..i].trim_end();
        }
    }
    value
}
