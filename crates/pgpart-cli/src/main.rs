//! pgpart CLI - inspect and create partitions of Postgres tables

mod config;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use config::CliConfig;
use pgpart_core::{
    Entity, PartitionBound, PartitionKey, PartitionOptions, PartitionedEntity, Predicate,
    PredicateBuilder, ScopedEntity, SqlValue, TableTarget,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "pgpart")]
#[command(about = "Partition-aware routing and partition management for Postgres tables")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the child partitions of a table
    Partitions(TableArgs),

    /// Check whether a table exists
    Exists(TableArgs),

    /// Show the primary key used when creating partitions
    PrimaryKey(TableArgs),

    /// Create a range partition covering [start, end)
    CreateRange {
        #[command(flatten)]
        table: TableArgs,

        #[command(flatten)]
        create: CreateArgs,

        /// Inclusive lower bound (JSON, bare text, MINVALUE or MAXVALUE)
        #[arg(long)]
        start: String,

        /// Exclusive upper bound
        #[arg(long)]
        end: String,
    },

    /// Create a list partition accepting the given values
    CreateList {
        #[command(flatten)]
        table: TableArgs,

        #[command(flatten)]
        create: CreateArgs,

        /// Accepted value (repeatable)
        #[arg(long = "value", required = true)]
        values: Vec<String>,
    },

    /// Print the SELECT that routes a partition-key condition
    Select(SelectArgs),
}

#[derive(Args)]
struct TableArgs {
    /// Parent table; defaults to ?table= in DATABASE_URL
    #[arg(short, long)]
    table: Option<String>,

    /// Partition key columns, comma-separated
    #[arg(short, long, value_delimiter = ',')]
    key: Vec<String>,

    /// Partition key SQL expression (repeatable, always a complex key)
    #[arg(long = "key-expr", conflicts_with = "key")]
    key_expr: Vec<String>,

    /// Declared primary key
    #[arg(long, default_value = pgpart_core::entity::DEFAULT_PRIMARY_KEY)]
    primary_key: String,
}

#[derive(Args)]
struct CreateArgs {
    /// Child table name; derived from the parent when omitted
    #[arg(long)]
    name: Option<String>,

    /// Do not add a primary key to the new partition
    #[arg(long)]
    no_primary_key: bool,
}

#[derive(Args)]
struct SelectArgs {
    #[command(flatten)]
    table: TableArgs,

    /// Read from this child partition instead of the parent
    #[arg(long)]
    partition: Option<String>,

    /// Partition key equals this value
    #[arg(long, conflicts_with_all = ["start", "values"])]
    eq: Option<String>,

    /// Range lower bound, used with --end
    #[arg(long, requires = "end")]
    start: Option<String>,

    #[arg(long, requires = "start")]
    end: Option<String>,

    /// Partition key is one of these values (repeatable)
    #[arg(long = "value", conflicts_with = "start")]
    values: Vec<String>,
}

impl CreateArgs {
    fn options(&self) -> PartitionOptions {
        let options = PartitionOptions {
            name: self.name.clone(),
            ..PartitionOptions::default()
        };
        if self.no_primary_key {
            options.without_primary_key()
        } else {
            options
        }
    }
}

#[derive(Serialize)]
struct Created<'a> {
    table: &'a str,
    partition: String,
    bound: PartitionBound,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Partitions(table) => {
            let entity = connect(table).await?;
            let partitions = entity.partitions().await?;
            if cli.json {
                println!("{}", serde_json::to_string(&partitions)?);
            } else {
                for name in &partitions {
                    println!("{}", name);
                }
            }
        }
        Commands::Exists(table) => {
            let exists = connect(table).await?.partition_table_exists().await?;
            print_result(cli.json, &exists, &exists)?;
        }
        Commands::PrimaryKey(table) => {
            let primary_key = connect(table).await?.primary_key().await?;
            print_result(cli.json, &primary_key, &primary_key)?;
        }
        Commands::CreateRange {
            table,
            create,
            start,
            end,
        } => {
            let entity = connect(table).await?;
            let (start, end) = (parse_value(start)?, parse_value(end)?);
            let partition = entity
                .create_range_partition(start.clone(), end.clone(), create.options())
                .await?;
            report_created(
                cli.json,
                &entity,
                partition,
                PartitionBound::Range { start, end },
            )?;
        }
        Commands::CreateList {
            table,
            create,
            values,
        } => {
            let entity = connect(table).await?;
            let values = parse_values(values)?;
            let partition = entity
                .create_list_partition(values.clone(), create.options())
                .await?;
            report_created(cli.json, &entity, partition, PartitionBound::List { values })?;
        }
        Commands::Select(args) => {
            // SQL generation only; DATABASE_URL is consulted for ?table= alone.
            let default_table = CliConfig::from_env_if_set()?.and_then(|c| c.table);
            let sql = select_sql(args, default_table.as_deref())?;
            print_result(cli.json, &sql, &sql)?;
        }
    }

    Ok(())
}

/// Load configuration, open a pool and decorate the table named by `table`.
async fn connect(table: &TableArgs) -> Result<PartitionedEntity> {
    let config = CliConfig::from_env()?;
    let entity = table.entity(config.table.as_deref())?;
    let pool = pgpart_postgres::connect(
        &config.database_url,
        config.max_connections,
        config.schema.clone(),
    )
    .await
    .context("Failed to connect to DATABASE_URL")?;
    Ok(pgpart_postgres::decorate(&pool, entity))
}

impl TableArgs {
    fn entity(&self, default_table: Option<&str>) -> Result<Entity> {
        let table = self
            .table
            .clone()
            .or_else(|| default_table.map(str::to_string))
            .context("No table given: pass --table or add ?table= to DATABASE_URL")?;
        let key = if !self.key_expr.is_empty() {
            PartitionKey::expression(self.key_expr.iter().cloned())
        } else if !self.key.is_empty() {
            PartitionKey::columns(&self.key)
        } else {
            // Inspection and DDL never read the key; select requires one.
            PartitionKey::simple(&self.primary_key)
        };
        debug!("Entity '{}' partitioned by {}", table, key.to_sql());
        Ok(Entity::new(table, key).with_primary_key(&self.primary_key))
    }
}

fn select_sql(args: &SelectArgs, default_table: Option<&str>) -> Result<String> {
    if args.table.key.is_empty() && args.table.key_expr.is_empty() {
        bail!("select needs the partition key: pass --key or --key-expr");
    }
    let entity = args.table.entity(default_table)?;
    let predicates = select_predicates(&entity, args)?;
    Ok(match &args.partition {
        Some(child) => ScopedEntity::new(Arc::new(entity), child).select_sql(&predicates),
        None => entity.select_sql(&predicates),
    })
}

fn select_predicates(entity: &Entity, args: &SelectArgs) -> Result<Vec<Predicate>> {
    let predicates = PredicateBuilder::new(entity);
    if let Some(eq) = &args.eq {
        return Ok(vec![predicates.eq(parse_value(eq)?)]);
    }
    if let (Some(start), Some(end)) = (&args.start, &args.end) {
        return Ok(vec![predicates.range(parse_value(start)?, parse_value(end)?)]);
    }
    if !args.values.is_empty() {
        return Ok(vec![predicates.list(&parse_values(&args.values)?)]);
    }
    Ok(Vec::new())
}

fn report_created(
    json: bool,
    entity: &PartitionedEntity,
    partition: String,
    bound: PartitionBound,
) -> Result<()> {
    info!(
        "Created {} partition '{}' of '{}'",
        bound.kind(),
        partition,
        entity.entity().table_name()
    );
    let created = Created {
        table: entity.entity().table_name(),
        partition,
        bound,
    };
    print_result(json, &created, &created.partition)
}

fn print_result<T: Serialize + ?Sized>(
    json: bool,
    value: &T,
    plain: &dyn std::fmt::Display,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", plain);
    }
    Ok(())
}

/// Parse a command-line bound value. JSON is tried first; anything that is
/// not JSON is taken as text, except the range keywords `MINVALUE` and
/// `MAXVALUE` which pass through unquoted.
fn parse_value(arg: &str) -> Result<SqlValue> {
    let trimmed = arg.trim();
    if trimmed.eq_ignore_ascii_case("MINVALUE") || trimmed.eq_ignore_ascii_case("MAXVALUE") {
        return Ok(SqlValue::raw(trimmed.to_ascii_uppercase()));
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => json_to_sql_value(value),
        Err(_) => Ok(SqlValue::Text(arg.to_string())),
    }
}

fn parse_values(args: &[String]) -> Result<Vec<SqlValue>> {
    args.iter().map(|v| parse_value(v)).collect()
}

fn json_to_sql_value(value: Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Int(i),
            None => SqlValue::Float(
                n.as_f64()
                    .with_context(|| format!("Unrepresentable number {}", n))?,
            ),
        },
        Value::String(s) => SqlValue::Text(s),
        Value::Array(items) => SqlValue::Tuple(
            items
                .into_iter()
                .map(json_to_sql_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(_) => bail!("JSON objects are not valid partition values"),
    })
}
