//! neptune-ttl Binary
//!
//! Runs one extraction invocation over a batch read from a file or
//! fetched from the stream endpoint. Acknowledgments are printed to stdout
//! as JSON lines; logs go to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use neptune_ttl::stream::IteratorType;
use neptune_ttl::{
    Config, DynamoDbTable, EventId, ExpirySink, MemoryTable, StreamBatch, StreamClient,
    StreamQuery, TtlExtractor,
};
use tracing::{info, info_span, Span};
use tracing_subscriber::{fmt, EnvFilter};

/// Extract TTL properties from a Neptune stream batch into an expiry table
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON parameter blob with `dynamodb_table` and `neptune_endpoint`
    #[arg(long, env = "AdditionalParams")]
    params: String,

    /// Where expiry rows are written
    #[arg(long, value_enum, default_value_t = SinkKind::Dynamodb)]
    sink: SinkKind,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a batch read from a file, or from stdin with `-`
    Extract {
        #[arg(short, long, default_value = "-")]
        input: String,
    },

    /// Fetch one batch from the stream endpoint and process it
    Poll {
        #[arg(long, value_enum, default_value_t = IteratorArg::After)]
        iterator: IteratorArg,

        /// Commit number of the starting position
        #[arg(long)]
        commit_num: Option<i64>,

        /// Operation number of the starting position
        #[arg(long, default_value_t = 1)]
        op_num: i64,

        /// Maximum records to fetch
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SinkKind {
    /// The DynamoDB table named in the parameters
    Dynamodb,
    /// An in-process table, logged at the end (dry run)
    Memory,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IteratorArg {
    At,
    After,
    TrimHorizon,
    Latest,
}

impl From<IteratorArg> for IteratorType {
    fn from(arg: IteratorArg) -> Self {
        match arg {
            IteratorArg::At => IteratorType::AtSequenceNumber,
            IteratorArg::After => IteratorType::AfterSequenceNumber,
            IteratorArg::TrimHorizon => IteratorType::TrimHorizon,
            IteratorArg::Latest => IteratorType::Latest,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("neptune_ttl=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_json(&args.params)?;

    let batch = match args.command {
        Command::Extract { input } => {
            if input == "-" {
                StreamBatch::from_reader(std::io::stdin().lock())?
            } else {
                StreamBatch::from_path(&input)?
            }
        }
        Command::Poll {
            iterator,
            commit_num,
            op_num,
            limit,
        } => {
            let query = StreamQuery {
                iterator: iterator.into(),
                position: commit_num.map(|commit_num| EventId { commit_num, op_num }),
                limit,
            };
            let client = StreamClient::new(&config)?;
            info!(url = %client.url(), iterator = %query.iterator, "Polling stream");
            client.fetch(&query).await?
        }
    };

    let span = info_span!(
        "invocation",
        table = %config.dynamodb_table,
        records = batch.len()
    );

    let acked = match args.sink {
        SinkKind::Dynamodb => {
            let table = DynamoDbTable::connect(&config).await;
            run(table, batch, span).await?
        }
        SinkKind::Memory => {
            let table = MemoryTable::new();
            let acked = run(table.clone(), batch, span).await?;
            for entry in table.entries() {
                info!(
                    object_id = %entry.object_id,
                    object_type = %entry.object_type,
                    ttl = %entry.ttl,
                    "Expiry row"
                );
            }
            acked
        }
    };

    info!(acknowledged = acked, "Invocation finished");
    Ok(())
}

/// Drive one pass, printing acknowledgments as they arrive
async fn run<S: ExpirySink>(sink: S, batch: StreamBatch, span: Span) -> anyhow::Result<usize> {
    let extractor = TtlExtractor::new(sink, span);
    let mut acks = Box::pin(extractor.process(batch));

    let mut count = 0;
    while let Some(ack) = acks.try_next().await? {
        println!("{}", serde_json::to_string(&ack)?);
        count += 1;
    }
    Ok(count)
}
