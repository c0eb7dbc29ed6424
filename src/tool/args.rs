//! Command-line arguments for each lifecycle verb

use super::options::Options;

fn push_vars(args: &mut Vec<String>, opts: &Options) {
    for (key, value) in opts.vars() {
        args.push("-var".to_string());
        args.push(format!("{key}={value}"));
    }
}

fn push_no_color(args: &mut Vec<String>, opts: &Options) {
    if opts.no_color() {
        args.push("-no-color".to_string());
    }
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

pub fn init(opts: &Options) -> Vec<String> {
    let mut args = strings(&["init", "-upgrade=false"]);
    push_no_color(&mut args, opts);
    args
}

pub fn apply(opts: &Options) -> Vec<String> {
    let mut args = strings(&["apply", "-input=false", "-auto-approve", "-lock=false"]);
    push_vars(&mut args, opts);
    push_no_color(&mut args, opts);
    args
}

pub fn destroy(opts: &Options) -> Vec<String> {
    let mut args = strings(&["destroy", "-auto-approve", "-input=false", "-lock=false"]);
    push_vars(&mut args, opts);
    push_no_color(&mut args, opts);
    args
}

/// `plan` with `-detailed-exitcode`: 0 = no changes, 2 = changes pending
pub fn plan(opts: &Options) -> Vec<String> {
    let mut args = strings(&["plan", "-input=false", "-lock=false", "-detailed-exitcode"]);
    if let Some(path) = opts.plan_file_path() {
        args.push(format!("-out={}", path.display()));
    }
    push_vars(&mut args, opts);
    push_no_color(&mut args, opts);
    args
}

pub fn validate(opts: &Options) -> Vec<String> {
    let mut args = strings(&["validate"]);
    push_no_color(&mut args, opts);
    args
}

/// Outputs are always read as JSON, so color is always off
pub fn output(name: &str) -> Vec<String> {
    strings(&["output", "-no-color", "-json", name])
}

pub fn version() -> Vec<String> {
    strings(&["version", "-json"])
}
