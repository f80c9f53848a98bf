// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the run, validate and render subcommands for isolated task files

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::value::{Kwargs, Value};

#[derive(Parser)]
#[command(name = "pyoperator")]
#[command(about = "Run Python callables as workflow tasks inside isolated virtualenvs")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute an isolated task definition
    Run {
        #[arg(help = "Path to task YAML file")]
        task: PathBuf,

        #[arg(
            short = 'k',
            long = "kwarg",
            help = "Additional op_kwargs entry (key=value, value parsed as YAML)"
        )]
        kwargs: Vec<String>,

        #[arg(
            short = 's',
            long = "string-arg",
            help = "Additional string argument, appended after the file's"
        )]
        string_args: Vec<String>,
    },

    /// Check a task definition without executing it
    Validate {
        #[arg(help = "Path to task YAML file")]
        task: PathBuf,
    },

    /// Print the driver script a run would execute
    Render {
        #[arg(help = "Path to task YAML file")]
        task: PathBuf,
    },
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parse `key=value` pairs; values are read as YAML scalars or collections.
    pub fn parse_kwargs(kwargs: &[String]) -> anyhow::Result<Kwargs> {
        let mut parsed = Kwargs::new();

        for kwarg in kwargs {
            let Some((key, value)) = kwarg.split_once('=') else {
                return Err(anyhow::anyhow!(
                    "Invalid kwarg format '{}'. Expected 'key=value'",
                    kwarg
                ));
            };
            let value = serde_yaml::from_str(value).unwrap_or_else(|_| Value::from(value));
            parsed.insert(key.to_string(), value);
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kwargs() {
        let kwargs = vec![
            "count=3".to_string(),
            "name=nightly".to_string(),
            "tags=[a, b]".to_string(),
            "query=select 1 = 1".to_string(),
        ];

        let parsed = Args::parse_kwargs(&kwargs).unwrap();

        assert_eq!(parsed.get("count"), Some(&Value::from(3)));
        assert_eq!(parsed.get("name"), Some(&Value::from("nightly")));
        assert_eq!(parsed["tags"][0], Value::from("a"));
        assert_eq!(parsed.get("query"), Some(&Value::from("select 1 = 1")));
    }

    #[test]
    fn test_parse_kwargs_invalid() {
        let kwargs = vec!["invalid_format".to_string()];
        assert!(Args::parse_kwargs(&kwargs).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
