use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;

use inline_translate::parsers::html::{parse_with_encoding, serialize_document};
use inline_translate::translation::{
    ConfigManager, TranslationConfig, TranslationOutcome, TranslationService,
};

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
struct Cli {
    /// HTML file to translate, or "-" to read from stdin
    #[arg(value_name = "INPUT")]
    input: Option<String>,

    /// Write the translated document here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target language code, e.g. zh-CN, en, ja
    #[arg(short = 't', long = "target-lang", value_name = "LANG")]
    target_lang: Option<String>,

    /// Model name
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Chat-completion API base URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// URL the document was fetched from, checked against excluded domains
    #[arg(long, value_name = "URL")]
    page_url: Option<String>,

    /// Preferred number of paragraphs per request
    #[arg(short, long, value_name = "N")]
    batch_size: Option<usize>,

    /// Translate inline markup as plain text
    #[arg(long)]
    no_rich_text: bool,

    /// Write an example configuration file and exit
    #[arg(long, value_name = "FILE")]
    init_config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    use inline_translate::env::{core::LogLevel, EnvVar};

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        match LogLevel::get_or_default("info".to_string()).as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    };

    // stdout 可能是译文输出，日志一律写 stderr
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<TranslationConfig, Box<dyn std::error::Error>> {
    let mut config = ConfigManager::load(cli.config.as_deref())?.into_config();

    if let Some(lang) = &cli.target_lang {
        config.target_language = lang.clone();
    }
    if let Some(model) = &cli.model {
        config.model_name = model.clone();
    }
    if let Some(api_url) = &cli.api_url {
        config.api_url = api_url.clone();
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if cli.no_rich_text {
        config.rich_text = false;
    }

    config.validate()?;
    Ok(config)
}

fn read_input(input: &str) -> io::Result<Vec<u8>> {
    if input == "-" {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data)?;
        Ok(data)
    } else {
        fs::read(input)
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &cli.init_config {
        ConfigManager::generate_example_config(path)?;
        eprintln!("Example configuration written to {}", path.display());
        return Ok(());
    }

    let Some(input) = cli.input.as_deref() else {
        return Err("no input given (use \"-\" for stdin)".into());
    };

    let config = load_config(&cli)?;
    let data = read_input(input)?;
    let (dom, document_encoding) = parse_with_encoding(&data, None);

    // 页面 DOM 是 Rc 树，只能在单线程运行时上处理
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let summary = runtime.block_on(async {
        let service = TranslationService::from_config(config)?;
        service.translate_document(&dom, cli.page_url.as_deref()).await
    })?;

    match summary.outcome {
        TranslationOutcome::ExcludedDomain => tracing::info!("页面域名已排除，原样输出"),
        TranslationOutcome::Busy => tracing::warn!("翻译服务忙，原样输出"),
        TranslationOutcome::Completed => tracing::info!(
            "完成: {} 段, {} 批, 错误 {}, 耗时 {:?}",
            summary.collected,
            summary.batches.batches,
            summary.batches.errored,
            summary.elapsed
        ),
    }

    let html = serialize_document(&dom, &document_encoding)?;
    match &cli.output {
        Some(path) => fs::write(path, html)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&html)?;
            stdout.flush()?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(error) = run(cli) {
        eprintln!("Error: {}", error);
        process::exit(1);
    }
}
