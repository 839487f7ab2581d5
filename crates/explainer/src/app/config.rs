use clap::{Arg, ArgAction, Command};

pub fn config_command() -> Command {
    Command::new("config")
        .about("Show the resolved configuration")
        .arg(
            Arg::new("json")
                .long("json")
                .help("Output in JSON format")
                .action(ArgAction::SetTrue),
        )
}
