use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use contented::Error;
use contented::config::AppConfig;
use contented::database::models::Pagination;
use contented::database::repositories::TaskFilter;
use contented::domain::{
    MAX_SCREENS, OperationScope, TaskOperation, TaskParams, TaskRequest, TaskStatus,
};
use contented::logging::init_logging;
use contented::services::ServiceContainer;
use contented::storage::scan::scan_content_dir;

#[derive(Parser, Debug)]
#[command(name = "contented", version, about = "Media catalog and preview task pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the task pipeline until Ctrl-C
    Serve,
    /// Catalog the containers and files under CONTENT_DIR
    Scan,
    /// Generate previews for one container or all of them
    Previews {
        #[arg(long)]
        container: Option<String>,
        /// Only files larger than this many bytes (default: PREVIEW_OVER_SIZE)
        #[arg(long)]
        min_size: Option<u64>,
        /// Empty the preview directory first
        #[arg(long)]
        clear: bool,
    },
    /// Delete every preview of a container
    ClearPreviews {
        #[arg(long)]
        container: String,
    },
    /// List tasks
    Tasks {
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        container: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    /// Run a single task to completion
    Submit {
        operation: TaskOperation,
        /// Content id, or container id for container operations
        target: String,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_SCREENS)))]
        screens: Option<u32>,
        #[arg(long)]
        start: Option<u32>,
        #[arg(long)]
        codec: Option<String>,
    },
    /// Cancel a task that has not started
    Cancel { id: String },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a preview batch result. A partial failure still prints the reports
/// of the items that went through before returning the error.
fn print_batch<T: Serialize>(result: contented::Result<T>) -> anyhow::Result<()> {
    match result {
        Ok(value) => print_json(&value),
        Err(Error::PreviewBatch(batch)) => {
            print_json(&batch.reports)?;
            Err(Error::PreviewBatch(batch).into())
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("loading configuration")?;
    let (logging, _guard) = init_logging(&config.log_dir).context("initializing logging")?;

    let services = ServiceContainer::new(config)
        .await
        .context("initializing services")?;

    match cli.command {
        Commands::Serve => {
            services.start().await?;
            logging.start_retention_cleanup(services.cancellation_token());
            info!("contented running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            services.shutdown().await;
        }
        Commands::Scan => {
            let summary = scan_content_dir(
                &services.config.content_dir,
                services.config.max_search_depth,
                services.store.catalog.as_ref(),
            )
            .await?;
            print_json(&summary)?;
        }
        Commands::Previews {
            container,
            min_size,
            clear,
        } => {
            let min_size = min_size.unwrap_or(services.config.media.preview_over_size);
            let engine = &services.engine;
            match container {
                Some(id) => {
                    let container = services.store.catalog.get_container(&id).await?;
                    let _guard = engine.lock_container(&container.id).await;
                    if clear {
                        engine.clear_container_previews(&container).await?;
                    }
                    print_batch(engine.create_container_previews(&container, min_size).await)?;
                }
                None => {
                    if clear {
                        for container in services.store.catalog.list_containers().await? {
                            let _guard = engine.lock_container(&container.id).await;
                            engine.clear_container_previews(&container).await?;
                        }
                    }
                    print_batch(engine.create_all_previews(min_size).await)?;
                }
            }
        }
        Commands::ClearPreviews { container } => {
            let container = services.store.catalog.get_container(&container).await?;
            let _guard = services.engine.lock_container(&container.id).await;
            services.engine.clear_container_previews(&container).await?;
        }
        Commands::Tasks {
            status,
            content,
            container,
            limit,
        } => {
            let filter = TaskFilter {
                status,
                content_id: content,
                container_id: container,
                search: None,
                pagination: Pagination::new(limit, 0),
            };
            let (tasks, total) = services.tasks.list(&filter).await?;
            info!(total, shown = tasks.len(), "Listed tasks");
            print_json(&tasks)?;
        }
        Commands::Submit {
            operation,
            target,
            screens,
            start,
            codec,
        } => {
            let mut params = TaskParams::default();
            if let Some(screens) = screens {
                params.number_of_screens = screens;
            }
            if let Some(start) = start {
                params.start_time_seconds = start;
            }
            if let Some(codec) = codec {
                params.codec = codec;
            }
            let request = match operation.scope() {
                OperationScope::Content => TaskRequest::for_content(operation, target),
                OperationScope::Container => TaskRequest::for_container(operation, target),
            }
            .with_params(params);

            services.queue.start();
            let submitted = services.tasks.submit(request).await;
            services.shutdown().await;
            let task = services.tasks.get(&submitted?).await?;
            print_json(&task)?;
        }
        Commands::Cancel { id } => {
            print_json(&services.tasks.cancel(&id).await?)?;
        }
    }

    Ok(())
}
