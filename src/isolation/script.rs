// ABOUTME: Driver script generation for isolated invocations
// ABOUTME: Emits the Python program that loads arguments, declares the callable, calls it and stores the result

use super::callable::CallableSpec;
use super::codec::Codec;

/// Global made available to the callable, holding the string args.
pub const STRING_ARGS_GLOBAL: &str = "virtualenv_string_args";

/// Render the driver script.
///
/// The script takes exactly three arguments: input path, output path and
/// string-args path. When `pass_args` is false it never opens the input
/// path and calls the function with no arguments. The result is written only
/// when it is not `None`, using the same codec that encoded the input.
pub fn generate_driver_script(callable: &CallableSpec, codec: Codec, pass_args: bool) -> String {
    let module = codec.module();

    let load_args = if pass_args {
        format!(
            "with open(sys.argv[1], \"r\") as file:\n    arg_dict = {}\n",
            codec.load_expr()
        )
    } else {
        "arg_dict = {\"args\": [], \"kwargs\": {}}\n".to_string()
    };

    let mut script = String::new();
    script.push_str(&format!("import {}\n", module));
    script.push_str("import sys\n");
    script.push_str(&load_args);
    script.push_str("args = arg_dict[\"args\"]\n");
    script.push_str("kwargs = arg_dict[\"kwargs\"]\n");
    script.push_str("with open(sys.argv[3], \"r\") as file:\n");
    script.push_str(&format!(
        "    {} = list(map(lambda x: x.strip(), list(file)))\n",
        STRING_ARGS_GLOBAL
    ));
    script.push_str(&callable.declaration());
    script.push_str(&format!("res = {}(*args, **kwargs)\n", callable.name()));
    script.push_str("with open(sys.argv[2], \"w\") as file:\n");
    script.push_str(&format!("    res is not None and {}\n", codec.dump_expr()));
    script
}
