use std::{
	env,
	path::PathBuf,
	process,
	sync::{atomic::AtomicBool, Arc},
	time::Duration,
};

use log::*;
use signal_hook::flag;
use yatube::{
	api::{self, Api},
	config::{self, Config},
	db::Database,
	migration::Migrations,
	web::{self, Global},
};


enum Command {
	Serve,
	/// Creates a group with the given slug, title and description.
	CreateGroup(Vec<String>),
}


/// Splits the arguments into the config file path and the command to run.
fn parse_arguments(mut args: Vec<String>) -> (PathBuf, Command) {
	let config_path = if args.len() > 0 && args[0] != "create-group" {
		PathBuf::from(args.remove(0))
	} else if let Some(os) = env::var_os(config::CONFIG_FILE_ENV) {
		PathBuf::from(os)
	} else {
		PathBuf::from(config::CONFIG_FILE_PATH)
	};

	let command = if args.len() > 0 && args[0] == "create-group" {
		Command::CreateGroup(args.split_off(1))
	} else {
		Command::Serve
	};
	(config_path, command)
}

fn initialize_logging() {
	let result = env::var_os("SYSTEM_LOG_FILE").map(|os| PathBuf::from(os));

	if let Some(filename) = result {
		if let Err(e) = simple_logging::log_to_file(&filename, LevelFilter::Debug) {
			eprintln!("Unable to log to {}: {}", filename.display(), e);
			process::exit(1);
		}
	} else {
		env_logger::init()
	}
}

async fn load_database(config: &Config) -> yatube::db::Result<Database> {
	// If the path doesn't exist yet, create it
	let db_path = PathBuf::from(config.database_path());
	if let Some(parent) = db_path.parent() {
		if !parent.as_os_str().is_empty() {
			tokio::fs::create_dir_all(parent).await?;
		}
	}

	let db = Database::load(db_path).await?;
	// Does nothing if there is nothing to migrate
	Migrations::load().run(&db).await?;
	Ok(db)
}

async fn create_group(api: &Api, args: &[String]) -> bool {
	if args.len() < 2 {
		error!("Usage: yatube [config] create-group <slug> <title> [description]");
		return false;
	}
	let description = args.get(2).map(|s| s.as_str()).unwrap_or("");

	match api.create_group(&args[1], &args[0], description).await {
		Ok(group) => {
			info!("Group \"{}\" is available at /group/{}", group.title, group.slug);
			true
		}
		Err(api::Error::Invalid(errors)) => {
			error!("Unable to create group: {:?}", errors);
			false
		}
		Err(e) => {
			error!("Unable to create group: {}", e);
			false
		}
	}
}

#[tokio::main]
async fn main() {
	initialize_logging();

	let (config_path, command) = parse_arguments(env::args().skip(1).collect());
	let config = match Config::load(&config_path).await {
		Ok(c) => c,
		Err(e) => {
			error!("Unable to load config file {}: {}", config_path.display(), e);
			process::exit(1);
		}
	};

	let db = match load_database(&config).await {
		Ok(db) => db,
		Err(e) => {
			error!("Unable to load database: {}", e);
			process::exit(1);
		}
	};
	let api = Api::new(
		db,
		&config.media_path,
		Duration::from_secs(config.session_lifetime),
	);

	match command {
		Command::CreateGroup(args) =>
			if !create_group(&api, &args).await {
				process::exit(1);
			},
		Command::Serve => {
			// Catch signals
			let stop_flag = Arc::new(AtomicBool::new(false));
			for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
				if let Err(e) = flag::register(signal, stop_flag.clone()) {
					error!("Unable to register signal handler: {}", e);
					process::exit(1);
				}
			}

			let global = match Global::load(config, api) {
				Ok(g) => Arc::new(g),
				Err(e) => {
					error!("Unable to load templates: {:?}", e);
					process::exit(1);
				}
			};

			if let Err(e) = web::serve(stop_flag, global).await {
				error!("Web server stopped: {}", e);
				process::exit(1);
			}
			info!("Done.");
		}
	}
}
