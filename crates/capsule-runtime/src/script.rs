//! The unit script format and its interpreter.
//!
//! Units are written in a small line-oriented language:
//!
//! ```text
//! # comment
//! greeting = "hello"
//! answer = 42
//! alias = greeting
//! import pkg.helpers
//! import pkg.helpers as h
//! from pkg.helpers import shout, whisper
//! raise "refusing to initialize"
//! ```
//!
//! Source text is parsed into a [`Program`]. The same [`Program`],
//! serialized as JSON, is the body of a compiled cache file, so executing a
//! cache and executing its source have identical effects.

use crate::error::{LoaderError, LoaderResult};
use crate::runtime::Importer;
use crate::unit::{UnitRef, Value};
use serde::{Deserialize, Serialize};

/// A parsed unit body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Statements in execution order.
    pub statements: Vec<Statement>,
}

/// A single statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Statement {
    /// Bind a name in the unit namespace.
    Assign { target: String, value: Expr },

    /// Import a unit and bind it (or its top-level parent).
    Import {
        module: String,
        alias: Option<String>,
    },

    /// Import a unit and bind some of its attributes or children.
    FromImport { module: String, names: Vec<String> },

    /// Abort initialization.
    Raise { message: String },
}

/// Right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Expr {
    /// A literal value.
    Literal(Value),
    /// A (possibly dotted) name looked up at execution time.
    Name(String),
}

impl Program {
    /// Parse source text. `origin` is only used in error messages.
    pub fn parse(source: &str, origin: &str) -> LoaderResult<Program> {
        let mut statements = Vec::new();

        for (index, raw) in source.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let syntax = |message: String| LoaderError::Syntax {
                origin: origin.to_string(),
                line: index + 1,
                message,
            };
            statements.push(parse_statement(line).map_err(syntax)?);
        }

        Ok(Program { statements })
    }

    /// Decode a compiled body.
    pub fn from_bytes(bytes: &[u8]) -> LoaderResult<Program> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode as a compiled body.
    pub fn to_bytes(&self) -> LoaderResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Run the program inside `unit`'s namespace.
    ///
    /// Imports go through `importer`, which may re-enter the loader for
    /// this very unit; the unit must therefore already be registered.
    pub fn execute(&self, unit: &UnitRef, importer: &dyn Importer) -> LoaderResult<()> {
        for statement in &self.statements {
            match statement {
                Statement::Assign { target, value } => {
                    let value = evaluate(value, unit, importer)?;
                    unit.set_attr(target.clone(), value);
                }
                Statement::Import { module, alias } => {
                    importer.import(module)?;
                    match alias {
                        Some(alias) => unit.set_attr(alias.clone(), Value::Unit(module.clone())),
                        None => {
                            let top = module.split('.').next().unwrap_or(module);
                            unit.set_attr(top.to_string(), Value::Unit(top.to_string()));
                        }
                    }
                }
                Statement::FromImport { module, names } => {
                    let source = importer.import(module)?;
                    for name in names {
                        let value = match source.get_attr(name) {
                            Some(value) => value,
                            None => {
                                let child = format!("{}.{}", module, name);
                                match importer.import(&child) {
                                    Ok(_) => Value::Unit(child),
                                    Err(e) if e.is_not_found() => {
                                        return Err(LoaderError::ExecutionFailed {
                                            unit: unit.name().to_string(),
                                            message: format!(
                                                "cannot import name '{}' from '{}'",
                                                name, module
                                            ),
                                        })
                                    }
                                    Err(e) => return Err(e),
                                }
                            }
                        };
                        unit.set_attr(name.clone(), value);
                    }
                }
                Statement::Raise { message } => {
                    return Err(LoaderError::ExecutionFailed {
                        unit: unit.name().to_string(),
                        message: message.clone(),
                    })
                }
            }
        }
        Ok(())
    }
}

fn evaluate(expr: &Expr, unit: &UnitRef, importer: &dyn Importer) -> LoaderResult<Value> {
    let name = match expr {
        Expr::Literal(value) => return Ok(value.clone()),
        Expr::Name(name) => name,
    };

    let undefined = || LoaderError::ExecutionFailed {
        unit: unit.name().to_string(),
        message: format!("name '{}' is not defined", name),
    };

    let mut parts = name.split('.');
    let first = parts.next().unwrap_or(name);
    let mut value = unit.get_attr(first).ok_or_else(undefined)?;

    for part in parts {
        let target = match &value {
            Value::Unit(target) => importer.import(target)?,
            _ => return Err(undefined()),
        };
        value = target.get_attr(part).ok_or_else(undefined)?;
    }
    Ok(value)
}

fn parse_statement(line: &str) -> Result<Statement, String> {
    if let Some(rest) = keyword(line, "import") {
        let (module, alias) = match rest.split_once(" as ") {
            Some((module, alias)) => (module.trim(), Some(alias.trim())),
            None => (rest, None),
        };
        check_dotted(module)?;
        if let Some(alias) = alias {
            check_identifier(alias)?;
        }
        return Ok(Statement::Import {
            module: module.to_string(),
            alias: alias.map(str::to_string),
        });
    }

    if let Some(rest) = keyword(line, "from") {
        let (module, names) = rest
            .split_once(" import ")
            .ok_or_else(|| "expected 'from <unit> import <names>'".to_string())?;
        let module = module.trim();
        check_dotted(module)?;
        let names = names
            .split(',')
            .map(|n| {
                let n = n.trim();
                check_identifier(n).map(|_| n.to_string())
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Statement::FromImport {
            module: module.to_string(),
            names,
        });
    }

    if let Some(rest) = keyword(line, "raise") {
        let message = parse_string(rest).unwrap_or_else(|| rest.to_string());
        return Ok(Statement::Raise { message });
    }

    if let Some((target, value)) = line.split_once('=') {
        let target = target.trim();
        check_identifier(target)?;
        return Ok(Statement::Assign {
            target: target.to_string(),
            value: parse_expr(value.trim())?,
        });
    }

    Err(format!("unrecognized statement '{}'", line))
}

fn keyword<'a>(line: &'a str, word: &str) -> Option<&'a str> {
    line.strip_prefix(word)
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim)
}

fn parse_expr(text: &str) -> Result<Expr, String> {
    if text.is_empty() {
        return Err("missing value".to_string());
    }
    if let Some(s) = parse_string(text) {
        return Ok(Expr::Literal(Value::Str(s)));
    }
    match text {
        "true" => return Ok(Expr::Literal(Value::Bool(true))),
        "false" => return Ok(Expr::Literal(Value::Bool(false))),
        "none" => return Ok(Expr::Literal(Value::None)),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Expr::Literal(Value::Int(i)));
    }
    if let Ok(f) = text.parse::<f64>() {
        if text.contains('.') {
            return Ok(Expr::Literal(Value::Float(f)));
        }
    }
    if text.starts_with('[') && text.ends_with(']') {
        let inner = text[1..text.len() - 1].trim();
        if inner.is_empty() {
            return Ok(Expr::Literal(Value::List(Vec::new())));
        }
        let items = inner
            .split(',')
            .map(|item| match parse_expr(item.trim())? {
                Expr::Literal(v) => Ok(v),
                Expr::Name(n) => Err(format!("list items must be literals, found '{}'", n)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Expr::Literal(Value::List(items)));
    }
    check_dotted(text)?;
    Ok(Expr::Name(text.to_string()))
}

fn parse_string(text: &str) -> Option<String> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    if inner.contains('"') {
        return None;
    }
    Some(inner.to_string())
}

fn check_identifier(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(format!("invalid identifier '{}'", name))
    }
}

fn check_dotted(name: &str) -> Result<(), String> {
    name.split('.').try_for_each(check_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statements() {
        let program = Program::parse(
            r#"
# a comment
greeting = "hello"
answer = 42
ratio = 0.5
flags = [true, false]
alias = greeting
import pkg.helpers
import pkg.helpers as h
from pkg import a, b
raise "boom"
"#,
            "test.src",
        )
        .unwrap();

        assert_eq!(program.statements.len(), 9);
        assert_eq!(
            program.statements[0],
            Statement::Assign {
                target: "greeting".to_string(),
                value: Expr::Literal(Value::Str("hello".to_string())),
            }
        );
        assert_eq!(
            program.statements[3],
            Statement::Assign {
                target: "flags".to_string(),
                value: Expr::Literal(Value::List(vec![Value::Bool(true), Value::Bool(false)])),
            }
        );
        assert_eq!(
            program.statements[6],
            Statement::Import {
                module: "pkg.helpers".to_string(),
                alias: Some("h".to_string()),
            }
        );
        assert_eq!(
            program.statements[7],
            Statement::FromImport {
                module: "pkg".to_string(),
                names: vec!["a".to_string(), "b".to_string()],
            }
        );
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = Program::parse("ok = 1\n\n9lives = 3\n", "bad.src").unwrap_err();
        match err {
            LoaderError::Syntax { origin, line, .. } => {
                assert_eq!(origin, "bad.src");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_statement() {
        assert!(Program::parse("print hello", "x.src").is_err());
        assert!(Program::parse("from pkg a", "x.src").is_err());
    }

    #[test]
    fn test_compiled_body_roundtrip() {
        let program = Program::parse("x = 1\nimport os.path as p\n", "x.src").unwrap();
        let bytes = program.to_bytes().unwrap();
        assert_eq!(Program::from_bytes(&bytes).unwrap(), program);
    }

    #[test]
    fn test_invalid_body() {
        assert!(matches!(
            Program::from_bytes(b"not json"),
            Err(LoaderError::Json(_))
        ));
    }
}
