use clap::{Arg, ArgAction, Command};

pub fn watch_command() -> Command {
    Command::new("watch")
        .about("Poll jobs until each one completes or fails")
        .arg(
            Arg::new("job_ids")
                .help("Job ids to watch (e.g. jq_42)")
                .required(true)
                .num_args(1..)
                .index(1),
        )
        .arg(
            Arg::new("url")
                .long("url")
                .help("admin-ajax.php endpoint (overrides config)"),
        )
        .arg(
            Arg::new("nonce")
                .long("nonce")
                .help("Nonce sent with every status request"),
        )
        .arg(
            Arg::new("interval-ms")
                .long("interval-ms")
                .help("Delay between successful polls, in milliseconds")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("max-retries")
                .long("max-retries")
                .help("Consecutive failed requests tolerated per job")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print one JSON object per update")
                .action(ArgAction::SetTrue),
        )
}
