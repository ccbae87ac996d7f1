use automata_engine::config::{read_json_file, Limits};
use automata_engine::engine::{solve, Solution, TaskRequest};
use clap::{Arg, ArgMatches, Command};
use color_eyre::eyre::Result;
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize)]
struct NamedSolution<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(flatten)]
    solution: &'a Solution,
}

/// Flags given on the command line override whatever the config file said
fn apply_limit_flags(args: &ArgMatches, limits: &mut Limits) {
    if let Some(value) = args.get_one::<usize>("max-dfa-states") {
        limits.max_dfa_states = *value;
    }
    if let Some(value) = args.get_one::<usize>("pda-moves") {
        limits.pda_move_budget = *value;
    }
    if let Some(value) = args.get_one::<usize>("tm-steps") {
        limits.tm_step_budget = *value;
    }
    if let Some(value) = args.get_one::<usize>("max-depth") {
        limits.grammar.max_depth = *value;
    }
    if let Some(value) = args.get_one::<usize>("max-candidates") {
        limits.grammar.max_candidates = *value;
    }
    if let Some(value) = args.get_one::<usize>("max-length") {
        limits.grammar.max_string_length = *value;
    }
}

fn limit_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .value_name("N")
        .value_parser(clap::value_parser!(usize))
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let args = Command::new("automata")
                        .version("0.1")
                        .about("Solve automata theory tasks: subset construction, DFA minimization, pushdown and Turing machine simulation, grammar ambiguity")
                        .arg(
                            Arg::new("task-file")
                                .short('t')
                                .long("task-file")
                                .help("JSON file holding the task and the machine or grammar it runs on")
                                .value_name("TASK FILE")
                                .value_parser(clap::value_parser!(PathBuf))
                                .required(true)
                        )
                        .arg(
                            Arg::new("config")
                                .short('c')
                                .long("config")
                                .help("JSON file with work limits. Limit flags given on the command line take precedence")
                                .value_name("CONFIG FILE")
                                .value_parser(clap::value_parser!(PathBuf))
                        )
                        .arg(limit_arg("max-dfa-states", "Most DFA states subset construction may create"))
                        .arg(limit_arg("pda-moves", "Most configurations the pushdown acceptance search may expand"))
                        .arg(limit_arg("tm-steps", "Most steps a Turing machine may take"))
                        .arg(limit_arg("max-depth", "Most rule applications in one grammar derivation"))
                        .arg(limit_arg("max-candidates", "Most candidate strings the ambiguity search checks"))
                        .arg(limit_arg("max-length", "Longest candidate string the ambiguity search generates"))
                        .arg(
                            Arg::new("output")
                            .short('o')
                            .long("output")
                            .help("Write the solution to this file instead of standard output")
                            .value_name("OUTPUT FILE")
                            .value_parser(clap::value_parser!(PathBuf))
                        )
                        .arg(
                            Arg::new("dot")
                            .short('d')
                            .long("dot")
                            .help("Write the derived automaton as a Graphviz DOT file")
                            .value_name("DOT FILE")
                            .value_parser(clap::value_parser!(PathBuf))
                        )
                        .arg(
                            Arg::new("name")
                            .short('n')
                            .long("name")
                            .help("Label for the solution, overrides the name in the task file")
                            .value_name("NAME")
                            .value_parser(clap::value_parser!(String))
                        )
                        .get_matches();

    let mut limits = match args.get_one::<PathBuf>("config") {
        Some(config_path) => Limits::load(config_path)?,
        None => Limits::default(),
    };
    apply_limit_flags(&args, &mut limits);

    let task_path = match args.get_one::<PathBuf>("task-file") {
        Some(file_path) => file_path,
        None => unreachable!("clap enforces the required task file"),
    };
    let request: TaskRequest = read_json_file(task_path, "task file")?;

    let name = args
        .get_one::<String>("name")
        .cloned()
        .or_else(|| request.name.clone());

    info!(
        "Running {} from {}",
        request.task.get_name(),
        task_path.display()
    );
    let solution = solve(&request.task, &limits)?;

    let json_string = serde_json::to_string_pretty(&NamedSolution {
        name: name.as_deref(),
        solution: &solution,
    })?;

    match args.get_one::<PathBuf>("output") {
        Some(out_file_path) => {
            fs::write(out_file_path, json_string)?;
            info!("Solution written to {}", out_file_path.display());
        }
        None => println!("{}", json_string),
    }

    if let Some(dot_file_path) = args.get_one::<PathBuf>("dot") {
        match solution.to_dot()? {
            Some(dot) => {
                fs::write(dot_file_path, dot)?;
                info!("Automaton written to {}", dot_file_path.display());
            }
            None => warn!(
                "Task {} does not produce a finite automaton, no DOT file written",
                request.task.get_name()
            ),
        }
    }

    Ok(())
}
