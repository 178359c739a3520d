//! Typed key-value config files for the demo worlds.
//!
//! One declaration per line, `name:type = value`, with `#` comments:
//!
//! ```text
//! # a planar world
//! name:s      = 'disc demo'
//! aabb:f[4]   = 0 1 0 1
//! start:v2    = 0.1 0.5
//! goal:v2     = 0.9 0.5
//! h:f         = 0.05
//! max_steps:i = 200000
//! discs:v2[1] = 0.5 0.5
//! disc_r:f[1] = 0.2
//! ```
//!
//! Types: `s` (single- or double-quoted string), `f`, `i`, `v2`, `v3`,
//! and fixed-size arrays of each (`f[4]`, `v2[2]`, ...). This format
//! belongs to the demo binaries; the engine itself only sees the
//! parameter structs built from it.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CfgValue {
    Str(String),
    Flt(f64),
    Int(i64),
    V2([f64; 2]),
    V3([f64; 3]),
    StrArr(Vec<String>),
    FltArr(Vec<f64>),
    IntArr(Vec<i64>),
    V2Arr(Vec<[f64; 2]>),
    V3Arr(Vec<[f64; 3]>),
}

#[derive(Debug)]
pub struct CfgError {
    pub lineno: usize,
    pub message: String,
}

impl fmt::Display for CfgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config line {}: {}", self.lineno, self.message)
    }
}

impl std::error::Error for CfgError {}

fn err(lineno: usize, message: impl Into<String>) -> CfgError {
    CfgError { lineno, message: message.into() }
}

#[derive(Debug, Default)]
pub struct Config {
    values: HashMap<String, CfgValue>,
}

impl Config {
    pub fn parse(input: &str) -> Result<Config, CfgError> {
        let mut values = HashMap::new();
        for (idx, raw) in input.lines().enumerate() {
            let lineno = idx + 1;
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            let eq = line
                .find('=')
                .ok_or_else(|| err(lineno, "expected 'name:type = value'"))?;
            let (decl, value) = (line[..eq].trim(), line[eq + 1..].trim());
            let colon = decl
                .find(':')
                .ok_or_else(|| err(lineno, "declaration must carry a type"))?;
            let (name, ty) = (decl[..colon].trim(), decl[colon + 1..].trim());
            if name.is_empty() {
                return Err(err(lineno, "empty key name"));
            }

            let (base, arity) = parse_type(ty, lineno)?;
            let parsed = parse_value(base, arity, value, lineno)?;
            values.insert(name.to_string(), parsed);
        }
        Ok(Config { values })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&CfgValue> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(CfgValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn flt(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(CfgValue::Flt(v)) => Some(*v),
            Some(CfgValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(CfgValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn v2(&self, name: &str) -> Option<[f64; 2]> {
        match self.values.get(name) {
            Some(CfgValue::V2(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn flt_arr(&self, name: &str) -> Option<&[f64]> {
        match self.values.get(name) {
            Some(CfgValue::FltArr(v)) => Some(v),
            _ => None,
        }
    }

    pub fn v2_arr(&self, name: &str) -> Option<&[[f64; 2]]> {
        match self.values.get(name) {
            Some(CfgValue::V2Arr(v)) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseType {
    Str,
    Flt,
    Int,
    V2,
    V3,
}

/// `f` → (Flt, None); `v2[3]` → (V2, Some(3)).
fn parse_type(ty: &str, lineno: usize) -> Result<(BaseType, Option<usize>), CfgError> {
    let (base, arity) = match ty.find('[') {
        Some(open) => {
            let close = ty
                .rfind(']')
                .ok_or_else(|| err(lineno, "unterminated array size"))?;
            let n: usize = ty[open + 1..close]
                .parse()
                .map_err(|_| err(lineno, "malformed array size"))?;
            (&ty[..open], Some(n))
        }
        None => (ty, None),
    };
    let base = match base {
        "s" | "str" => BaseType::Str,
        "f" | "flt" => BaseType::Flt,
        "i" | "int" => BaseType::Int,
        "v2" => BaseType::V2,
        "v3" => BaseType::V3,
        other => return Err(err(lineno, format!("unknown type '{}'", other))),
    };
    Ok((base, arity))
}

/// Splits a value field into tokens, honouring quoted strings.
fn tokenize(value: &str, lineno: usize) -> Result<Vec<String>, CfgError> {
    let mut tokens = Vec::new();
    let mut chars = value.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '\'' || c == '"' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some(q) if q == c => break,
                    Some(other) => s.push(other),
                    None => return Err(err(lineno, "unterminated string")),
                }
            }
            tokens.push(s);
        } else {
            let mut s = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                s.push(c);
                chars.next();
            }
            tokens.push(s);
        }
    }
    Ok(tokens)
}

fn parse_value(
    base: BaseType,
    arity: Option<usize>,
    value: &str,
    lineno: usize,
) -> Result<CfgValue, CfgError> {
    let tokens = tokenize(value, lineno)?;
    let floats = |tokens: &[String]| -> Result<Vec<f64>, CfgError> {
        tokens
            .iter()
            .map(|t| t.parse().map_err(|_| err(lineno, format!("bad number '{}'", t))))
            .collect()
    };

    let width = match base {
        BaseType::V2 => 2,
        BaseType::V3 => 3,
        _ => 1,
    };
    let count = arity.unwrap_or(1);
    let expected = match base {
        BaseType::Str => count,
        _ => count * width,
    };
    if tokens.len() != expected {
        return Err(err(
            lineno,
            format!("expected {} value(s), found {}", expected, tokens.len()),
        ));
    }

    let value = match (base, arity) {
        (BaseType::Str, None) => CfgValue::Str(tokens[0].clone()),
        (BaseType::Str, Some(_)) => CfgValue::StrArr(tokens),
        (BaseType::Flt, None) => CfgValue::Flt(floats(&tokens)?[0]),
        (BaseType::Flt, Some(_)) => CfgValue::FltArr(floats(&tokens)?),
        (BaseType::Int, None) => CfgValue::Int(
            tokens[0]
                .parse()
                .map_err(|_| err(lineno, format!("bad integer '{}'", tokens[0])))?,
        ),
        (BaseType::Int, Some(_)) => CfgValue::IntArr(
            tokens
                .iter()
                .map(|t| {
                    t.parse().map_err(|_| err(lineno, format!("bad integer '{}'", t)))
                })
                .collect::<Result<_, _>>()?,
        ),
        (BaseType::V2, None) => {
            let f = floats(&tokens)?;
            CfgValue::V2([f[0], f[1]])
        }
        (BaseType::V3, None) => {
            let f = floats(&tokens)?;
            CfgValue::V3([f[0], f[1], f[2]])
        }
        (BaseType::V2, Some(_)) => {
            let f = floats(&tokens)?;
            CfgValue::V2Arr(f.chunks(2).map(|c| [c[0], c[1]]).collect())
        }
        (BaseType::V3, Some(_)) => {
            let f = floats(&tokens)?;
            CfgValue::V3Arr(f.chunks(3).map(|c| [c[0], c[1], c[2]]).collect())
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_primitive() {
        let cfg = Config::parse(
            "name:s = 'disc demo'\n\
             h:f = 0.05\n\
             max_steps:i = 1000\n\
             start:v2 = 0.1 0.5\n\
             up:v3 = 0 0 1\n",
        )
        .unwrap();
        assert_eq!(cfg.str("name"), Some("disc demo"));
        assert_eq!(cfg.flt("h"), Some(0.05));
        assert_eq!(cfg.int("max_steps"), Some(1000));
        assert_eq!(cfg.v2("start"), Some([0.1, 0.5]));
        assert_eq!(cfg.get("up"), Some(&CfgValue::V3([0.0, 0.0, 1.0])));
    }

    #[test]
    fn parses_arrays() {
        let cfg = Config::parse(
            "aabb:f[4] = 0 1 0 1\n\
             discs:v2[2] = 0.5 0.5 0.2 0.8\n\
             tags:s[2] = 'a' \"b\"\n",
        )
        .unwrap();
        assert_eq!(cfg.flt_arr("aabb"), Some(&[0.0, 1.0, 0.0, 1.0][..]));
        assert_eq!(cfg.v2_arr("discs"), Some(&[[0.5, 0.5], [0.2, 0.8]][..]));
        assert_eq!(cfg.get("tags"), Some(&CfgValue::StrArr(vec!["a".into(), "b".into()])));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let cfg = Config::parse("# header\n\nh:f = 0.1 # trailing\n").unwrap();
        assert_eq!(cfg.flt("h"), Some(0.1));
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        assert!(Config::parse("aabb:f[4] = 0 1 0\n").is_err());
        assert!(Config::parse("start:v2 = 0.1\n").is_err());
    }

    #[test]
    fn malformed_declarations_are_rejected() {
        assert!(Config::parse("h = 0.1\n").is_err());
        assert!(Config::parse("h:q = 0.1\n").is_err());
        assert!(Config::parse("h:f 0.1\n").is_err());
        assert!(Config::parse("s:s = 'unterminated\n").is_err());
    }
}
