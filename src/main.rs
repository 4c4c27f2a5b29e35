use std::fs;
use std::io;
use std::io::Write;
use std::path::PathBuf;

use colored::*;
use docopt::Docopt;
use serde::Deserialize;

use buildpp::config::BuilderConfig;
use buildpp::depmap::DependencyMap;
use buildpp::driver::Preprocessor;
use buildpp::error::print_warning_summary;
use buildpp::io::{read_to_string, Input, Output};
use buildpp::readers::Credentials;

const USAGE: &str = "
buildpp

Usage:
    buildpp preprocess [-f] [-w <wname>]... [-i <includefolder>]... [--deps <depsfile>] [--line-control] [--no-remote-relative] [--clear-cache] [<source> [<target>]]
    buildpp (-h | --help)
    buildpp --version

Commands:
    preprocess      Run the directive/expression preprocessor over a source.

Options:
    -f --force                      Overwrite the target file if it already exists.
    -w --warning <wname>            Warning to disable entirely (repeatable).
    -i --include <includefolder>    Folder to search for includes (repeatable).
    --deps <depsfile>               Dependency map to load pins from and save resolved commits to.
    --line-control                  Emit line-control markers for downstream tooling.
    --no-remote-relative            Resolve relative includes from a remote source against the top-level file instead of the remote source's own directory.
    --clear-cache                   Discard the commit cache and memoized reads before running.
    -h --help                       Show usage information and exit.
    -v --version                    Print the version number and exit.
";

#[derive(Debug, Deserialize)]
struct Args {
    cmd_preprocess: bool,
    flag_version: bool,
    flag_force: bool,
    flag_warning: bool,
    arg_wname: Vec<String>,
    flag_include: bool,
    arg_includefolder: Vec<String>,
    flag_deps: bool,
    arg_depsfile: String,
    flag_line_control: bool,
    flag_no_remote_relative: bool,
    flag_clear_cache: bool,
    arg_source: String,
    arg_target: String,
}

fn main() {
    let args: Args = Docopt::new(USAGE).and_then(|d| d.deserialize()).unwrap_or_else(|e| e.exit());

    if args.flag_version {
        println!("v0.1.0");
        std::process::exit(0);
    }

    let input = if args.arg_source.is_empty() {
        Input::Stdin(io::stdin())
    } else {
        Input::File(fs::File::open(&args.arg_source).expect("could not open input file"))
    };
    let source = read_to_string(input).expect("could not read input as UTF-8");
    let file_name = if args.arg_source.is_empty() { None } else { Some(args.arg_source.clone()) };

    let config = BuilderConfig {
        include_folders: args.arg_includefolder.iter().map(PathBuf::from).collect(),
        remote_relative_includes: !args.flag_no_remote_relative,
        generate_line_control_statements: args.flag_line_control,
        clear_cache: args.flag_clear_cache,
        muted_warnings: args.arg_wname.clone(),
        warnings_maximum: 10,
        credentials: Credentials::default(),
    };

    let mut preprocessor = Preprocessor::new(config);

    let deps_path = (args.flag_deps && !args.arg_depsfile.is_empty()).then(|| PathBuf::from(&args.arg_depsfile));
    if let Some(path) = &deps_path {
        if let Ok(map) = DependencyMap::load(path) {
            preprocessor.load_dependencies(map);
        }
    }

    if !args.cmd_preprocess {
        unreachable!("docopt guarantees one command is selected");
    }

    match preprocessor.execute(file_name, &source) {
        Ok(text) => {
            let target_exists = !args.arg_target.is_empty() && std::path::Path::new(&args.arg_target).exists();
            if target_exists && !args.flag_force {
                eprintln!("{}: target already exists, use -f to overwrite", "error".red().bold());
                std::process::exit(1);
            }

            let mut output = if args.arg_target.is_empty() {
                Output::Standard(io::stdout())
            } else {
                Output::File(fs::File::create(&args.arg_target).expect("could not open output file"))
            };
            output.write_all(text.as_bytes()).expect("could not write output");

            if let Some(path) = &deps_path {
                preprocessor.dependencies().save(path).expect("could not save dependency map");
            }

            print_warning_summary();
        }
        Err(error) => {
            eprintln!("{}: {}", "error".red().bold(), error);
            print_warning_summary();
            std::process::exit(1);
        }
    }
}
