//! Cache key derivation from call arguments.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

const DEFAULT_KEY_PREFIX: &str = "cache";

// == Call Arguments ==
/// One argument of an intercepted call.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A plain value, usable in keys and hashes
    Value(Value),
    /// A request, connection or similar live object. Never rendered or hashed.
    Live,
}

/// Ordered arguments of an intercepted call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs(Vec<Arg>);

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value argument. A value that cannot be encoded is kept as
    /// [`Arg::Live`] so it never reaches a key.
    pub fn value<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        let arg = match serde_json::to_value(value) {
            Ok(v) => Arg::Value(v),
            Err(e) => {
                warn!(error = %e, position = self.0.len(), "Unencodable call argument left out of key");
                Arg::Live
            }
        };
        self.0.push(arg);
        self
    }

    pub fn live(mut self) -> Self {
        self.0.push(Arg::Live);
        self
    }

    pub fn push(&mut self, arg: Arg) {
        self.0.push(arg);
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        match self.0.get(index)? {
            Arg::Value(v) => Some(v),
            Arg::Live => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// SHA-256 over the JSON array of all non-live arguments, hex encoded.
    pub fn digest(&self) -> String {
        let values: Vec<&Value> = self
            .0
            .iter()
            .filter_map(|arg| match arg {
                Arg::Value(v) => Some(v),
                Arg::Live => None,
            })
            .collect();
        let encoded = serde_json::to_vec(&values).unwrap_or_default();
        hex::encode(Sha256::digest(&encoded))
    }
}

/// Renders a key segment. Strings render bare, everything else as JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// == Key Spec ==
/// How a marker derives its cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    /// Literal text with positional `{N}` placeholders, e.g. `report:{0}:{1}`
    Template(String),
    /// `prefix:class:method:<param values>`, using the argument positions in `params`
    Structured {
        prefix: String,
        class: String,
        method: String,
        params: Vec<usize>,
    },
    /// `prefix:<digest of all arguments>`
    Hashed { prefix: String },
}

impl KeySpec {
    pub fn template(template: impl Into<String>) -> Self {
        KeySpec::Template(template.into())
    }

    pub fn structured(
        prefix: impl Into<String>,
        class: impl Into<String>,
        method: impl Into<String>,
        params: impl IntoIterator<Item = usize>,
    ) -> Self {
        KeySpec::Structured {
            prefix: prefix.into(),
            class: class.into(),
            method: method.into(),
            params: params.into_iter().collect(),
        }
    }

    pub fn hashed(prefix: impl Into<String>) -> Self {
        KeySpec::Hashed {
            prefix: prefix.into(),
        }
    }

    // == Resolve ==
    /// Derives the key for `args`. A spec that cannot be rendered from
    /// `args` (missing or live placeholder argument, or a structured spec
    /// without params) falls back to a digest of all arguments.
    pub fn resolve(&self, args: &CallArgs) -> String {
        match self {
            KeySpec::Template(template) => render_template(template, args)
                .unwrap_or_else(|| hashed_key(template_prefix(template), args)),
            KeySpec::Structured {
                prefix,
                class,
                method,
                params,
            } => {
                let base = format!("{prefix}:{class}:{method}");
                if params.is_empty() {
                    return hashed_key(&base, args);
                }
                let parts: Option<Vec<String>> =
                    params.iter().map(|&i| args.get(i).map(render)).collect();
                match parts {
                    Some(parts) => format!("{base}:{}", parts.join(":")),
                    None => hashed_key(&base, args),
                }
            }
            KeySpec::Hashed { prefix } => hashed_key(prefix, args),
        }
    }
}

impl From<&str> for KeySpec {
    fn from(template: &str) -> Self {
        KeySpec::template(template)
    }
}

impl From<String> for KeySpec {
    fn from(template: String) -> Self {
        KeySpec::Template(template)
    }
}

fn hashed_key(prefix: &str, args: &CallArgs) -> String {
    let prefix = if prefix.is_empty() {
        DEFAULT_KEY_PREFIX
    } else {
        prefix
    };
    format!("{prefix}:{}", args.digest())
}

/// Literal text before the first placeholder, without trailing separators.
fn template_prefix(template: &str) -> &str {
    let literal = template.split('{').next().unwrap_or_default();
    literal.trim_end_matches(':')
}

fn render_template(template: &str, args: &CallArgs) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}')?;
        let index: usize = after[..close].trim().parse().ok()?;
        out.push_str(&render(args.get(index)?));
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Some(out)
}
