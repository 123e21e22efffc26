use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use pan_gstin_mapper::config::{Config, RunOptions};
use pan_gstin_mapper::logger;
use pan_gstin_mapper::models::{JobParameters, JobProgress};
use pan_gstin_mapper::orchestrator::{lookup_gstin_details, App};
use pan_gstin_mapper::services::{CheckpointLedger, JobRegistry, SpreadsheetStore};

/// PAN 批量查询 GSTIN 的自动化工具
#[derive(Parser, Debug)]
#[command(name = "pan_gstin_mapper", about = "从 GST 门户批量查询 PAN 名下的 GSTIN")]
struct Cli {
    /// 输入 Excel 文件路径
    #[arg(short = 'f', long = "file", default_value = "pan_numbers.xlsx")]
    file: String,

    /// 无头模式运行浏览器
    #[arg(long)]
    headless: bool,

    /// 测试模式：只处理第一个 PAN，输出详细日志
    #[arg(short = 't', long = "test")]
    test: bool,

    /// 最多处理的 PAN 数量
    #[arg(short = 'l', long = "limit")]
    limit: Option<usize>,

    /// 从断点继续
    #[arg(short = 'r', long = "resume")]
    resume: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 查询单个 GSTIN 的工商详情
    Details {
        /// 要查询的 GSTIN（15 位）
        gstin: String,

        /// 把查到的详情写回这个 Excel 文件
        #[arg(short = 'f', long = "file")]
        file: Option<String>,
    },

    /// 列出任务记录和断点进度
    Jobs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志（测试模式默认 debug）
    if cli.test {
        logger::init_with_level("debug");
    } else {
        logger::init();
    }

    // 加载配置
    let config = Config::from_env();

    match cli.command {
        Some(Commands::Details { gstin, file }) => {
            run_details(&config, &gstin, file.as_deref()).await
        }
        Some(Commands::Jobs) => {
            run_jobs(&config);
            Ok(())
        }
        None => {
            let options = RunOptions {
                excel_file: cli.file,
                headless: cli.headless,
                test_mode: cli.test,
                limit: cli.limit,
                resume: cli.resume,
            };
            run_batch(config, options).await
        }
    }
}

/// 批量查询：建任务记录 → 跑主循环 → 回写任务状态
async fn run_batch(config: Config, options: RunOptions) -> Result<()> {
    let registry = JobRegistry::new(&config.jobs_file);
    let filename = Path::new(&options.excel_file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(&options.excel_file)
        .to_string();
    let job = registry.create(
        &filename,
        &options.excel_file,
        JobParameters {
            headless: options.headless,
            test_mode: options.test_mode,
            limit: options.limit,
            resume: options.resume,
        },
    )?;
    registry.mark_processing(&job.id)?;
    info!("📋 任务 {} 开始", job.id);

    let app = match App::initialize(config, options).await {
        Ok(app) => app,
        Err(e) => {
            registry.mark_failed(&job.id, &e.to_string())?;
            return Err(e);
        }
    };
    let excel_file = app.excel_file().to_string();

    match app.run().await {
        Ok(()) => {
            registry.mark_completed(&job.id, &excel_file)?;
            info!("📋 任务 {} 完成", job.id);
            Ok(())
        }
        Err(e) => {
            registry.mark_failed(&job.id, &e.to_string())?;
            Err(e)
        }
    }
}

/// 查询单个 GSTIN 的详情，按需写回 Excel
async fn run_details(config: &Config, gstin: &str, file: Option<&str>) -> Result<()> {
    let details = lookup_gstin_details(config, gstin).await?;

    println!("\nGSTIN:    {}", details.gstin);
    println!("商号:     {}", details.trade_name);
    println!("注册日期: {}", details.registration_date);
    println!("HSN 编码: {}", details.hsn_codes.join(", "));

    if let Some(file) = file {
        let store = SpreadsheetStore::new(file);
        if store.update_gstin_details(&details.gstin, &details)? {
            info!("✅ 详情已写入 {}", file);
        } else {
            error!("❌ GSTIN {} 不在 {} 的 GSTIN 表中", details.gstin, file);
        }
    }

    Ok(())
}

/// 打印任务记录和断点进度
fn run_jobs(config: &Config) {
    let registry = JobRegistry::new(&config.jobs_file);
    let jobs = registry.load();
    if jobs.is_empty() {
        println!("暂无任务记录");
        return;
    }

    println!("{:<38} {:<12} {:<28} 文件", "任务 ID", "状态", "创建时间");
    println!("{}", "-".repeat(100));
    for (id, job) in &jobs {
        println!(
            "{:<38} {:<12} {:<28} {}",
            id,
            job.status.to_string(),
            job.created_at,
            job.filename
        );
        if let Some(error) = &job.error {
            println!("    错误: {}", error);
        }
    }

    let checkpoint = CheckpointLedger::new(&config.checkpoint_file).load();
    if let Some(progress) = JobProgress::from_checkpoint(&checkpoint) {
        println!(
            "\n断点进度: 已处理 {} 个 PAN（{}）",
            progress.processed_count, progress.timestamp
        );
    }
}
