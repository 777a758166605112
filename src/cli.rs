/*!
askdb Command Line Interface

Runs the same operations as the REST server against a single database:
describe its schema, suggest questions, answer a question, or run SQL.
*/

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use askdb::config::Settings;
use askdb::query::QueryPipeline;
use askdb::reader::{resolve, ConnectionDescriptor};
use askdb::schema::inspect;
use askdb::suggest::QuestionSuggester;
use askdb::{Reader, VERSION};

#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "Ask a database questions in plain language")]
#[command(version = VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub settings: Settings,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print tables, columns and relationships
    Schema {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Print example questions for the database
    Suggest {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Answer a question with generated SQL
    Ask {
        /// The question to answer
        question: String,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Execute SQL directly, without the model
    Exec {
        /// The SQL statement to execute
        sql: String,

        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

/// Which database to use
#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct ConnectionArgs {
    /// Connection descriptor as JSON, e.g. '{"type":"mysql","config":{"host":"localhost","database":"shop"}}'
    #[arg(long)]
    pub db: Option<String>,

    /// Local CSV file, loaded as table `data`
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

impl ConnectionArgs {
    fn descriptor(&self) -> anyhow::Result<ConnectionDescriptor> {
        if let Some(json) = &self.db {
            return serde_json::from_str(json).context("--db is not a valid connection descriptor");
        }
        let path = self
            .csv
            .as_ref()
            .context("either --db or --csv is required")?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(ConnectionDescriptor::csv_content(content))
    }
}

impl Commands {
    fn connection(&self) -> &ConnectionArgs {
        match self {
            Commands::Schema { connection }
            | Commands::Suggest { connection }
            | Commands::Ask { connection, .. }
            | Commands::Exec { connection, .. } => connection,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: &Commands, settings: &Settings, reader: &dyn Reader) -> anyhow::Result<()> {
    match command {
        Commands::Schema { .. } => print_json(&inspect(reader).await?),
        Commands::Suggest { .. } => {
            let suggester = QuestionSuggester::new(settings.oracle.build()?);
            for question in suggester.suggest(reader).await? {
                println!("{}", question);
            }
            Ok(())
        }
        Commands::Ask { question, .. } => {
            let pipeline = QueryPipeline::new(settings.oracle.build()?, settings.query.clone());
            print_json(&pipeline.answer(question, &[], reader).await?)
        }
        Commands::Exec { sql, .. } => print_json(&reader.execute_sql(sql).await?.to_records()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "askdb=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let descriptor = cli.command.connection().descriptor()?;
    let reader = resolve(&descriptor, &cli.settings.resolver).await?;

    let outcome = run(&cli.command, &cli.settings, reader.as_ref()).await;
    reader.close().await;
    outcome
}
