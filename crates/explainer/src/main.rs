use explainer_config::ExplainerConfig;
use explainer_core::init_logging;

mod app;
mod commands;

fn main() {
    let app = app::build_cli();
    let matches = app.get_matches();

    let verbose = matches.get_flag("verbose");
    let logging = init_logging(!verbose);

    let loaded = ExplainerConfig::load_hierarchy();
    if let Ok(config) = &loaded {
        logging.set_debug(config.logging.debug());
    }

    if let Err(e) = commands::run_command(&matches, loaded) {
        // Handlers already told the user what went wrong.
        drop(e);
        std::process::exit(1);
    }
}
