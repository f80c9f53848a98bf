// ABOUTME: Callable definitions that can cross into an isolated interpreter
// ABOUTME: Validates inline `def` sources and module references before any execution is attempted

use thiserror::Error;

use crate::engine::binding::Signature;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct InvalidCallable(pub String);

/// Where the isolated interpreter gets the function from.
#[derive(Debug, Clone, PartialEq)]
pub enum CallableSource {
    /// Verbatim `def` text, stored dedented so it is valid at the top level
    /// of the driver script. Only the text crosses the boundary, so the
    /// function must not close over variables of its defining scope.
    Inline { source: String },
    /// A module importable inside the environment, e.g. an installed
    /// requirement or a module on the interpreter's path.
    Module { module: String },
}

/// A named, module-level function to run inside an isolated environment.
#[derive(Debug, Clone, PartialEq)]
pub struct CallableSpec {
    name: String,
    source: CallableSource,
    signature: Signature,
    signature_known: bool,
}

impl CallableSpec {
    /// Build a spec from the literal text of a `def` statement.
    ///
    /// The function name and signature are read from the definition header,
    /// which may span several lines. Lambdas, coroutine functions, decorated
    /// definitions and methods (first parameter `self`) are rejected.
    pub fn from_source(source: impl AsRef<str>) -> Result<Self, InvalidCallable> {
        let dedented = textwrap::dedent(source.as_ref());

        let mut offset = 0;
        let mut start = None;
        for line in dedented.split_inclusive('\n') {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                start = Some(offset);
                break;
            }
            offset += line.len();
        }
        let start =
            start.ok_or_else(|| InvalidCallable("callable source is empty".to_string()))?;

        let (name, signature) = parse_definition(dedented[start..].trim_start())?;

        let mut source = dedented.trim_end().to_string();
        source.push('\n');

        Ok(Self {
            name,
            source: CallableSource::Inline { source },
            signature,
            signature_known: true,
        })
    }

    /// Build a spec that imports `function` from `module` inside the environment.
    ///
    /// The signature of an imported function is unknown until one is
    /// declared with [`CallableSpec::with_signature`].
    pub fn from_module(
        module: impl Into<String>,
        function: impl Into<String>,
    ) -> Result<Self, InvalidCallable> {
        let module = module.into();
        let function = function.into();

        if module.is_empty() || !module.split('.').all(is_identifier) {
            return Err(InvalidCallable(format!(
                "'{}' is not a valid module path",
                module
            )));
        }
        if !is_identifier(&function) {
            return Err(InvalidCallable(format!(
                "'{}' is not a valid function name",
                function
            )));
        }

        Ok(Self {
            name: function,
            source: CallableSource::Module { module },
            signature: Signature::default(),
            signature_known: false,
        })
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self.signature_known = true;
        self
    }

    /// False for a module reference whose signature was never declared.
    pub fn has_signature(&self) -> bool {
        self.signature_known
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &CallableSource {
        &self.source
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Lines that make the function available at the top level of the driver script.
    pub fn declaration(&self) -> String {
        match &self.source {
            CallableSource::Inline { source } => source.clone(),
            CallableSource::Module { module } => {
                format!("from {} import {}\n", module, self.name)
            }
        }
    }
}

fn parse_definition(definition: &str) -> Result<(String, Signature), InvalidCallable> {
    let header = definition.lines().next().unwrap_or("").trim();
    let rest = definition
        .strip_prefix("def")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .ok_or_else(|| not_a_def(header))?
        .trim_start();

    let name: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if !is_identifier(&name) {
        return Err(InvalidCallable(format!(
            "could not read a function name from '{}'",
            header
        )));
    }

    let after_paren = rest[name.len()..].trim_start().strip_prefix('(').ok_or_else(|| {
        InvalidCallable(format!("missing parameter list in '{}'", header))
    })?;
    let params = parameter_list(after_paren).ok_or_else(|| {
        InvalidCallable(format!("unbalanced parameter list in '{}'", header))
    })?;

    if params.first().map(|param| param_name(param)) == Some("self") {
        return Err(InvalidCallable(format!(
            "'{}' looks like a method; only plain functions are supported",
            name
        )));
    }

    Ok((name, signature_of(&params)))
}

fn not_a_def(header: &str) -> InvalidCallable {
    let assigned_lambda = header
        .split_once('=')
        .map(|(target, value)| {
            is_identifier(target.trim()) && value.trim_start().starts_with("lambda")
        })
        .unwrap_or(false);

    if header.starts_with("lambda") || assigned_lambda {
        InvalidCallable("only functions defined with `def` are supported, not lambdas".to_string())
    } else if header.starts_with("async ") {
        InvalidCallable("coroutine functions (`async def`) are not supported".to_string())
    } else if header.starts_with('@') {
        InvalidCallable("decorated definitions are not supported, pass the bare `def`".to_string())
    } else {
        InvalidCallable(format!(
            "callable source must start with a `def` statement, found '{}'",
            header
        ))
    }
}

/// Top-level parameters between an already consumed `(` and its matching
/// `)`, which may be several lines further on. Comments are dropped and
/// string literals kept whole. `None` when the list never closes.
fn parameter_list(text: &str) -> Option<Vec<String>> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                current.push(c);
                let mut escaped = false;
                for next in chars.by_ref() {
                    current.push(next);
                    if escaped {
                        escaped = false;
                    } else if next == '\\' {
                        escaped = true;
                    } else if next == c {
                        break;
                    }
                }
            }
            '#' => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
                current.push(' ');
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' if depth == 0 => {
                params.push(current);
                return Some(params);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => params.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    None
}

/// Annotations and default values are ignored.
fn signature_of(params: &[String]) -> Signature {
    let mut signature = Signature::default();
    for raw in params {
        let param = raw.trim();
        if param.is_empty() || param == "*" || param == "/" {
            continue;
        }
        if let Some(rest) = param.strip_prefix("**") {
            if is_identifier(param_name(rest)) {
                signature.catch_all_kwargs = true;
            }
        } else if let Some(rest) = param.strip_prefix('*') {
            if is_identifier(param_name(rest)) {
                signature.var_positional = true;
            }
        } else if param.contains('=') {
            signature = signature.with_optional(param_name(param));
        } else {
            signature.params.push(param_name(param).to_string());
        }
    }
    signature
}

fn param_name(param: &str) -> &str {
    param
        .split(|c| c == ':' || c == '=')
        .next()
        .unwrap_or("")
        .trim()
}

pub(crate) fn is_identifier(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
