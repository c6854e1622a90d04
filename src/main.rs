use std::path::PathBuf;
use tracing::info;
use transwarp::config::{default_config_path, load_config};
use transwarp::{local, DbError, SqliteConnector, StatementType, Value, ENGINE};

const USAGE: &str = "usage: transwarp [config.toml] <sql> [args...]";

fn run(args: &[String]) -> transwarp::Result<()> {
    let (config_path, sql, params) = match args {
        [] => return Err(DbError::Config(USAGE.to_string())),
        [first] if first.ends_with(".toml") => return Err(DbError::Config(USAGE.to_string())),
        [first, sql, rest @ ..] if first.ends_with(".toml") => (PathBuf::from(first), sql, rest),
        [sql, rest @ ..] => match default_config_path() {
            Some(path) => (path, sql, rest),
            None => return Err(DbError::Config("no configuration directory".to_string())),
        },
    };

    info!("Loading configuration from {}", config_path.display());
    let config = load_config(&config_path)?;
    ENGINE.init_from_config(&config, SqliteConnector)?;

    let params: Vec<Value> = params.iter().map(|p| Value::Text(p.clone())).collect();
    if StatementType::from_sql(sql).returns_rows() {
        for row in local::query_many(sql, &params)? {
            let line = serde_json::to_string(&row).map_err(|e| DbError::Query(e.to_string()))?;
            println!("{}", line);
        }
    } else {
        let affected = local::execute(sql, &params)?;
        println!("{} row(s) affected", affected);
    }
    Ok(())
}

fn main() {
    // Logs go to stderr so rows on stdout stay machine readable
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    info!("Starting transwarp...");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
