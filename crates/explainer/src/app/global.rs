use clap::{Arg, ArgAction, Command};

pub fn root_command() -> Command {
    Command::new("explainer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Watch Explainer background jobs until they finish")
        .long_about("Polls the WordPress admin-ajax get_job_status endpoint for one or more Explainer jobs, printing progress as it arrives. Polling backs off on transport errors and stops once every job has completed or failed.")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
}
