use std::fs::File;
use std::os::fd::{FromRawFd, OwnedFd};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use taskq::client;
use taskq::config;
use taskq::daemon;
use taskq::events::{self, EventBus};
use taskq::executor::Executor;
use taskq::queue::models::TaskStatus;
use taskq::queue::Database;
use taskq::tasks;

#[derive(Parser)]
#[command(name = "taskq", version, about = "SQLite 기반 프로세스 격리 task queue")]
struct Cli {
    /// 데이터베이스 경로 (기본: $TASKQ_HOME/taskq.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatcher 루프 실행 (포그라운드)
    Worker,
    /// task 하나를 현재 프로세스에서 실행 (worker가 띄우는 child 진입점)
    #[command(hide = true)]
    Execute {
        task_id: String,
        /// stdout/stderr를 돌릴 상속된 fd
        #[arg(long)]
        log_fd: Option<i32>,
    },
    /// task 생성
    Create {
        /// 등록된 callable 이름 (예: builtin.echo)
        callable: String,
        /// JSON object 형식 keyword arguments
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// task 상세 조회
    Status {
        task_id: String,
        #[arg(long)]
        json: bool,
    },
    /// 최근 task 목록
    List {
        /// 상태 필터 (queued, in_progress, completed, failed, cancelled)
        #[arg(long)]
        status: Option<TaskStatus>,
        /// 최근 N개 항목
        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,
    },
    /// 종료된 task 재등록
    Enqueue { task_id: String },
    /// 상태별 개수
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let env = config::RealEnv;
    let home = config::taskq_home(&env);
    let cfg = config::loader::load_merged(&env);

    let is_worker = matches!(cli.command, Commands::Worker);

    // _guard must live until main() returns to flush non-blocking writer
    let _guard = if is_worker {
        let log_dir = config::resolve_log_dir(&cfg.daemon.log_dir, require_home(&home)?);
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix(daemon::log::LOG_PREFIX)
            .filename_suffix("log")
            .build(&log_dir)
            .context("failed to create log appender")?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("taskq=info".parse()?),
            )
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("taskq=info".parse()?),
            )
            .with_writer(std::io::stderr)
            .init();
        None
    };

    let db_path = match cli.db {
        Some(path) => path,
        None => {
            let path = config::default_db_path(&env)
                .context("cannot resolve taskq home: set TASKQ_HOME or HOME")?;
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            path
        }
    };

    match cli.command {
        Commands::Worker => daemon::start(require_home(&home)?, &db_path, &cfg).await?,
        Commands::Execute { task_id, log_fd } => {
            let sink = match log_fd {
                Some(fd) if fd < 0 => bail!("invalid --log-fd: {fd}"),
                // SAFETY: 부모가 이 프로세스에 넘겨준 pipe write end — 여기서 소유권을 가져간다
                Some(fd) => Some(File::from(unsafe { OwnedFd::from_raw_fd(fd) })),
                None => None,
            };

            let db = open_db(&db_path)?;
            let registry = tasks::builtin_registry();
            let mut events = EventBus::new();
            events::install_tracing_subscribers(&mut events);

            Executor::new(&db, &registry, &events)
                .with_max_output_size(cfg.tasks.max_output_size)
                .execute(&task_id, sink)?;
        }
        Commands::Create { callable, args } => {
            let arguments: serde_json::Value =
                serde_json::from_str(&args).context("--args should be valid JSON")?;
            let db = open_db(&db_path)?;
            let id = client::create_task(&db, &cfg.tasks, &callable, &arguments)?;
            println!("{id}");
        }
        Commands::Status { task_id, json } => {
            let task = client::get_status(&open_db(&db_path)?, &task_id)?;
            print!("{}", client::render_task(&task, json)?);
        }
        Commands::List { status, limit } => {
            print!("{}", client::list(&open_db(&db_path)?, status, limit)?);
        }
        Commands::Enqueue { task_id } => {
            print!("{}", client::enqueue(&open_db(&db_path)?, &task_id)?);
        }
        Commands::Summary => {
            print!("{}", client::summary(&open_db(&db_path)?)?);
        }
    }

    Ok(())
}

fn require_home(home: &Option<PathBuf>) -> Result<&Path> {
    home.as_deref()
        .context("cannot resolve taskq home: set TASKQ_HOME or HOME")
}

fn open_db(path: &Path) -> Result<Database> {
    let db = Database::open(path)?;
    db.initialize()?;
    Ok(db)
}
