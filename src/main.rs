use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use esp_codec::io::{DefaultFileWriter, FileWriter};
use esp_codec::{
    parse_string_table, reconcile, Archive, ExtractOptions, ExtractedString, ExtractionCache, Plugin,
    ReconcileSummary, StringFileSet, StringFileType, SUPPORTED_EXTENSIONS,
};

#[derive(Parser)]
#[command(name = "esp_codec")]
#[command(about = "读取 BSA 归档、ESP/ESM/ESL 插件与 STRING 文件，提取并写回可翻译字符串")]
#[command(version)]
struct Cli {
    /// 提取配置文件 (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 提高日志级别（-v 为 debug，-vv 为 trace）
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 提取可翻译字符串到 JSON
    Extract {
        /// 插件文件，可以有多个
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// 输出文件（单个输入）或目录（多个输入）
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 同时输出被过滤的文本
        #[arg(long)]
        unfiltered: bool,
        /// STRING 文件语言
        #[arg(long)]
        language: Option<String>,
        /// 提取结果缓存文件
        #[arg(long)]
        cache: Option<PathBuf>,
    },
    /// 把 JSON 中的译文写回插件或其 STRING 文件
    Apply {
        input: PathBuf,
        translations: PathBuf,
        /// 输出插件路径，默认覆盖输入（会先备份）
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        language: Option<String>,
    },
    /// 转换为轻量插件
    Eslify {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 显示插件统计信息
    Stats {
        input: PathBuf,
        #[arg(long)]
        language: Option<String>,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 解析后重建，检查输出与输入是否逐字节一致
    Roundtrip {
        input: PathBuf,
        /// 保存重建结果
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 列出归档中的文件
    BsaList {
        archive: PathBuf,
        /// 通配符过滤，例如 "strings/*.dlstrings"
        #[arg(long)]
        pattern: Option<String>,
    },
    /// 解压归档
    BsaExtract {
        archive: PathBuf,
        destination: PathBuf,
        #[arg(long)]
        pattern: Option<String>,
    },
    /// 以 JSON 输出 STRING/DLSTRINGS/ILSTRINGS 文件内容
    Strings {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 合并原文提取结果与旧译文
    Reconcile {
        original: PathBuf,
        translated: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut options = match &cli.config {
        Some(path) => ExtractOptions::load(path).with_context(|| format!("无法读取配置 {}", path.display()))?,
        None => ExtractOptions::default(),
    };

    match cli.command {
        Command::Extract {
            inputs,
            output,
            unfiltered,
            language,
            cache,
        } => {
            options.unfiltered |= unfiltered;
            if let Some(language) = language {
                options.language = language;
            }
            handle_extract(&inputs, output.as_deref(), &options, cache.as_deref())
        }
        Command::Apply {
            input,
            translations,
            output,
            language,
        } => {
            if let Some(language) = language {
                options.language = language;
            }
            handle_apply(&input, &translations, output.as_deref(), &options)
        }
        Command::Eslify { input, output } => handle_eslify(&input, output.as_deref()),
        Command::Stats { input, language, json } => {
            if let Some(language) = language {
                options.language = language;
            }
            handle_stats(&input, &options, json)
        }
        Command::Roundtrip { input, output } => handle_roundtrip(&input, output.as_deref()),
        Command::BsaList { archive, pattern } => handle_bsa_list(&archive, pattern.as_deref()),
        Command::BsaExtract {
            archive,
            destination,
            pattern,
        } => handle_bsa_extract(&archive, &destination, pattern.as_deref()),
        Command::Strings { file, output } => handle_strings(&file, output.as_deref()),
        Command::Reconcile {
            original,
            translated,
            output,
        } => handle_reconcile(&original, &translated, &output),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 验证输入文件
fn validate_input(input: &Path) -> Result<()> {
    if !input.exists() {
        bail!("输入文件不存在: {}", input.display());
    }

    let extension = input
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    if !SUPPORTED_EXTENSIONS.iter().any(|&ext| Some(ext) == extension.as_deref()) {
        bail!("输入文件必须是ESP、ESM或ESL文件: {}", input.display());
    }

    Ok(())
}

/// 本地化插件的 STRING 文件，找不到时返回空集合
fn load_string_files(plugin: &Plugin, language: &str) -> StringFileSet {
    if !plugin.is_localized() {
        return StringFileSet::new(plugin.stem(), language);
    }
    match StringFileSet::load_for_plugin(&plugin.path, language) {
        Ok(set) => set,
        Err(e) => {
            tracing::warn!("{} 是本地化插件，但未能加载 STRING 文件: {}", plugin.name(), e);
            StringFileSet::new(plugin.stem(), language)
        }
    }
}

fn write_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    DefaultFileWriter
        .write(&json, path)
        .with_context(|| format!("无法写入 {}", path.display()))?;
    Ok(())
}

fn read_strings(path: &Path) -> Result<Vec<ExtractedString>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("无法读取 {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} 不是有效的字符串 JSON", path.display()))
}

fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    input.with_file_name(format!("{}{}", stem, suffix))
}

fn extract_one(
    input: &Path,
    options: &ExtractOptions,
    cache: Option<&Mutex<ExtractionCache>>,
) -> Result<Vec<ExtractedString>> {
    validate_input(input)?;
    let plugin = Plugin::parse(input).with_context(|| format!("无法解析 {}", input.display()))?;
    let string_files = load_string_files(&plugin, &options.language);

    let strings = match cache {
        Some(cache) => {
            let mut cache = cache.lock().map_err(|_| anyhow::anyhow!("缓存锁已损坏"))?;
            plugin.extract_strings_cached(&string_files, options, &mut cache)?
        }
        None => plugin.extract_strings_with(&string_files, options),
    };
    Ok(strings)
}

fn handle_extract(
    inputs: &[PathBuf],
    output: Option<&Path>,
    options: &ExtractOptions,
    cache_path: Option<&Path>,
) -> Result<()> {
    let cache = match cache_path {
        Some(path) => Some(Mutex::new(ExtractionCache::load(path)?)),
        None => None,
    };

    let results: Vec<(PathBuf, Result<Vec<ExtractedString>>)> = inputs
        .par_iter()
        .map(|input| (input.clone(), extract_one(input, options, cache.as_ref())))
        .collect();

    let single = inputs.len() == 1;
    let mut failed = 0usize;
    for (input, result) in results {
        match result {
            Ok(strings) => {
                let target = match (output, single) {
                    (Some(path), true) => path.to_path_buf(),
                    (Some(dir), false) => {
                        let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
                        dir.join(format!("{}_strings.json", stem))
                    }
                    (None, _) => default_output(&input, "_strings.json"),
                };
                write_json(&strings, &target)?;
                tracing::info!("{}: {} 条字符串 -> {}", input.display(), strings.len(), target.display());
            }
            Err(e) => {
                failed += 1;
                tracing::error!("{}: {:#}", input.display(), e);
            }
        }
    }

    if let Some(cache) = cache {
        let cache = cache.into_inner().map_err(|_| anyhow::anyhow!("缓存锁已损坏"))?;
        tracing::debug!("缓存命中 {} 次，未命中 {} 次", cache.hits(), cache.misses());
        cache.save()?;
    }

    if failed > 0 {
        bail!("{} / {} 个文件处理失败", failed, inputs.len());
    }
    Ok(())
}

fn handle_apply(input: &Path, translations: &Path, output: Option<&Path>, options: &ExtractOptions) -> Result<()> {
    validate_input(input)?;
    let strings = read_strings(translations)?;
    let mut plugin = Plugin::parse(input).with_context(|| format!("无法解析 {}", input.display()))?;
    let output = output.unwrap_or(input);

    if plugin.is_localized() {
        let mut string_files = StringFileSet::load_for_plugin(input, &options.language)
            .with_context(|| format!("{} 是本地化插件，但找不到 STRING 文件", plugin.name()))?;
        let report = plugin.apply_translations(&strings, Some(&mut string_files))?;

        let strings_dir = output.parent().unwrap_or(Path::new(".")).join("Strings");
        let written = string_files.write_all(&strings_dir)?;
        tracing::info!("已更新 {} 条文本，写入 {} 个 STRING 文件", report.replaced, written.len());
        return Ok(());
    }

    let report = plugin.apply_translations(&strings, None)?;
    plugin.write_to_file(output)?;
    println!(
        "替换 {} 条，未变化 {} 条，未找到 {} 条 -> {}",
        report.replaced,
        report.unchanged,
        report.not_found.len(),
        output.display()
    );
    Ok(())
}

fn handle_eslify(input: &Path, output: Option<&Path>) -> Result<()> {
    validate_input(input)?;
    let mut plugin = Plugin::parse(input).with_context(|| format!("无法解析 {}", input.display()))?;
    let count = plugin.convert_to_light_plugin()?;
    let output = output.unwrap_or(input);
    plugin.write_to_file(output)?;
    println!("{} 条本地记录已重新编号 -> {}", count, output.display());
    Ok(())
}

fn handle_stats(input: &Path, options: &ExtractOptions, json: bool) -> Result<()> {
    validate_input(input)?;
    let plugin = Plugin::parse(input).with_context(|| format!("无法解析 {}", input.display()))?;
    let string_files = load_string_files(&plugin, &options.language);

    let stats = plugin.stats(&string_files);
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", stats);
    }
    Ok(())
}

fn handle_roundtrip(input: &Path, output: Option<&Path>) -> Result<()> {
    validate_input(input)?;
    let original = std::fs::read(input).with_context(|| format!("无法读取 {}", input.display()))?;
    let plugin = Plugin::parse(input).with_context(|| format!("无法解析 {}", input.display()))?;
    let rebuilt = plugin.to_bytes()?;

    if let Some(output) = output {
        DefaultFileWriter.write(&rebuilt, output)?;
    }

    if rebuilt != original {
        let first_diff = original
            .iter()
            .zip(&rebuilt)
            .position(|(a, b)| a != b)
            .unwrap_or(original.len().min(rebuilt.len()));
        bail!(
            "重建结果不一致: 原始 {} 字节，重建 {} 字节，首个差异位于 0x{:X}",
            original.len(),
            rebuilt.len(),
            first_diff
        );
    }

    println!("重建一致: {} ({} 字节)", input.display(), rebuilt.len());
    Ok(())
}

fn handle_bsa_list(archive_path: &Path, pattern: Option<&str>) -> Result<()> {
    let archive = Archive::open(archive_path).with_context(|| format!("无法打开 {}", archive_path.display()))?;
    let paths = match pattern {
        Some(pattern) => archive.glob(pattern),
        None => archive.list_paths(),
    };
    for path in &paths {
        println!("{}", path);
    }
    tracing::info!("{} 个文件", paths.len());
    Ok(())
}

fn handle_bsa_extract(archive_path: &Path, destination: &Path, pattern: Option<&str>) -> Result<()> {
    let archive = Archive::open(archive_path).with_context(|| format!("无法打开 {}", archive_path.display()))?;

    let Some(pattern) = pattern else {
        let report = archive.extract_all(destination);
        for (path, error) in &report.failed {
            tracing::error!("{}: {}", path, error);
        }
        println!("已解压 {} 个文件，失败 {} 个", report.extracted.len(), report.failed.len());
        if !report.failed.is_empty() {
            bail!("{} 个文件解压失败", report.failed.len());
        }
        return Ok(());
    };

    let paths = archive.glob(pattern);
    for path in &paths {
        archive
            .extract(path, destination)
            .with_context(|| format!("无法解压 {}", path))?;
    }
    println!("已解压 {} 个文件", paths.len());
    Ok(())
}

fn handle_strings(file: &Path, output: Option<&Path>) -> Result<()> {
    let file_type = StringFileType::from_path(file)?;
    let table: BTreeMap<u32, String> = parse_string_table(file, file_type)
        .with_context(|| format!("无法解析 {}", file.display()))?
        .into_iter()
        .collect();

    match output {
        Some(path) => write_json(&table, path)?,
        None => println!("{}", serde_json::to_string_pretty(&table)?),
    }
    tracing::info!("{}: {} 条文本", file.display(), table.len());
    Ok(())
}

fn handle_reconcile(original: &Path, translated: &Path, output: &Path) -> Result<()> {
    let original = read_strings(original)?;
    let translated = read_strings(translated)?;

    let merged = reconcile(&original, &translated);
    write_json(&merged, output)?;
    println!("{}", ReconcileSummary::from_strings(&merged));
    Ok(())
}
