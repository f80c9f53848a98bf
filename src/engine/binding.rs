// ABOUTME: Declared callable signatures and keyword binding against the host context
// ABOUTME: Replaces run-time signature reflection with an explicit parameter list checked against reserved keys

use serde::{Deserialize, Serialize};

use super::error::{OperatorError, Result};
use crate::value::Kwargs;

/// Context keys the host always provides. A positional parameter filled from
/// `op_args` may not use one of these names.
pub const RESERVED_CONTEXT_KEYS: &[&str] = &[
    "conf",
    "dag",
    "dag_run",
    "ds",
    "ds_nodash",
    "execution_date",
    "next_ds",
    "params",
    "prev_ds",
    "run_id",
    "task",
    "task_instance",
    "task_instance_key_str",
    "templates_dict",
    "test_mode",
    "ti",
    "ts",
    "ts_nodash",
];

/// Parameters of a task callable, declared by the task author.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// Parameter names in positional order.
    #[serde(default)]
    pub params: Vec<String>,

    /// Subset of `params` that have a default value.
    #[serde(default)]
    pub optional: Vec<String>,

    /// The callable accepts extra positional arguments (`*args`).
    #[serde(default)]
    pub var_positional: bool,

    /// The callable accepts arbitrary keyword arguments (`**kwargs`); the
    /// whole context is passed through.
    #[serde(default)]
    pub catch_all_kwargs: bool,
}

impl Signature {
    pub fn new<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Append a parameter that has a default value.
    pub fn with_optional(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.params.push(name.clone());
        self.optional.push(name);
        self
    }

    pub fn with_var_positional(mut self) -> Self {
        self.var_positional = true;
        self
    }

    pub fn with_catch_all_kwargs(mut self) -> Self {
        self.catch_all_kwargs = true;
        self
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.params.iter().any(|param| param == name)
    }

    /// First declared parameter, used to detect methods.
    pub fn first_param(&self) -> Option<&str> {
        self.params.first().map(String::as_str)
    }

    /// Check that `num_args` positional arguments plus `kwargs` can be bound
    /// to this signature.
    pub fn bind(&self, num_args: usize, kwargs: &Kwargs) -> std::result::Result<(), String> {
        if num_args > self.params.len() && !self.var_positional {
            return Err(format!(
                "too many positional arguments: expected at most {}, got {}",
                self.params.len(),
                num_args
            ));
        }

        for key in kwargs.keys() {
            match self.params.iter().position(|param| param == key) {
                Some(index) if index < num_args => {
                    return Err(format!("multiple values for argument '{}'", key));
                }
                Some(_) => {}
                None if self.catch_all_kwargs => {}
                None => return Err(format!("unexpected keyword argument '{}'", key)),
            }
        }

        let missing = self
            .params
            .iter()
            .skip(num_args)
            .find(|param| !kwargs.contains_key(*param) && !self.optional.contains(*param));
        if let Some(param) = missing {
            return Err(format!("missing a required argument: '{}'", param));
        }

        Ok(())
    }

    /// Reject positional parameters that collide with reserved context keys.
    pub fn check_reserved<'a, I>(&self, num_op_args: usize, reserved: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let reserved: Vec<&str> = reserved.into_iter().collect();
        for name in self.params.iter().take(num_op_args) {
            if reserved.contains(&name.as_str()) {
                return Err(OperatorError::ReservedName { name: name.clone() });
            }
        }
        Ok(())
    }
}

/// Select the keyword arguments a callable receives from `context`.
///
/// Positional parameters covered by `num_op_args` must not appear in the
/// context. A catch-all signature receives the whole context; otherwise only
/// the entries whose keys are declared parameters are passed.
pub fn determine_op_kwargs(
    signature: &Signature,
    context: &Kwargs,
    num_op_args: usize,
) -> Result<Kwargs> {
    signature.check_reserved(num_op_args, context.keys().map(String::as_str))?;

    if signature.catch_all_kwargs {
        return Ok(context.clone());
    }

    Ok(signature
        .params
        .iter()
        .filter_map(|name| {
            context
                .get(name)
                .map(|value| (name.clone(), value.clone()))
        })
        .collect())
}
