use anyhow::{anyhow, Context, Result};
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use colored::Colorize;
use relsign::archive::{ZipEntrySink, ZipEntrySource};
use relsign::config::{ConfigFile, ResignConfig};
use relsign::passwords::{PasswordFile, PasswordProvider, PromptPasswords, PASSWORD_FILE_ENV};
use relsign::signer::{resolve_tool, SignApkSigner};
use relsign::{logging, resign_target_files, ResignReport};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "relsign")]
#[command(about = "Re-sign the packages of a target-files archive with release keys", long_about = None)]
#[command(version)]
struct Cli {
    /// Input target-files zip
    input: PathBuf,

    /// Output target-files zip
    output: PathBuf,

    /// Path to signapk.jar
    #[arg(short = 's', long)]
    signapk_jar: Option<PathBuf>,

    /// Java executable used to run signapk.jar
    #[arg(long)]
    java: Option<PathBuf>,

    /// Maximum Java heap for signapk (e.g. 512m, 2g)
    #[arg(long)]
    java_heap: Option<String>,

    /// zipalign executable; signed packages are aligned when set
    #[arg(long)]
    zipalign: Option<PathBuf>,

    /// Sign the named packages with KEY instead of what apkcerts.txt says
    /// (A.apk,B.apk=KEY; repeatable)
    #[arg(short = 'e', long = "extra-apks", value_name = "SPEC")]
    extra_apks: Vec<String>,

    /// Map the platform test keys to DIR/{releasekey,media,shared,platform}
    /// (repeatable)
    #[arg(short = 'd', long, value_name = "DIR")]
    default_key_mappings: Vec<PathBuf>,

    /// Substitute key SRC with DEST (SRC=DEST; repeatable)
    #[arg(short = 'k', long = "key-mapping", value_name = "SRC=DEST")]
    key_mappings: Vec<String>,

    /// TOML configuration file; command-line options override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// File holding key passwords ([[[ secret ]]] key per line)
    #[arg(long, value_name = "FILE", env = PASSWORD_FILE_ENV)]
    password_file: Option<PathBuf>,

    /// Number of packages signed concurrently
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// One `-d` or `-k` option, applied in command-line order.
#[derive(Debug, PartialEq, Eq)]
enum KeyMappingStep<'a> {
    Defaults(&'a Path),
    Pair(&'a str),
}

impl Cli {
    /// Parse the command line, keeping the raw matches for option positions.
    fn parse_with_matches<I, T>(args: I) -> Result<(Self, ArgMatches), clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let cli = Self::from_arg_matches(&matches)?;
        Ok((cli, matches))
    }

    /// `-d` and `-k` options sorted by their position on the command line.
    fn key_mapping_steps(&self, matches: &ArgMatches) -> Vec<KeyMappingStep<'_>> {
        let mut steps: Vec<(usize, KeyMappingStep<'_>)> = Vec::new();
        if let Some(indices) = matches.indices_of("default_key_mappings") {
            steps.extend(
                indices
                    .zip(&self.default_key_mappings)
                    .map(|(index, dir)| (index, KeyMappingStep::Defaults(dir.as_path()))),
            );
        }
        if let Some(indices) = matches.indices_of("key_mappings") {
            steps.extend(
                indices
                    .zip(&self.key_mappings)
                    .map(|(index, pair)| (index, KeyMappingStep::Pair(pair.as_str()))),
            );
        }
        steps.sort_by_key(|(index, _)| *index);
        steps.into_iter().map(|(_, step)| step).collect()
    }

    /// Assemble the run configuration: config file first, then options.
    fn resign_config(&self, matches: &ArgMatches) -> Result<ResignConfig> {
        let mut config = ResignConfig::new();
        config.jobs = default_jobs();
        if let Some(path) = &self.config {
            config.merge_file(ConfigFile::load(path)?)?;
        }

        for step in self.key_mapping_steps(matches) {
            match step {
                KeyMappingStep::Defaults(dir) => {
                    config.with_default_key_mappings(dir);
                }
                KeyMappingStep::Pair(pair) => {
                    config.add_key_mapping(pair)?;
                }
            }
        }
        for spec in &self.extra_apks {
            config.add_extra_packages(spec)?;
        }

        if self.signapk_jar.is_some() {
            config.signer.signapk_jar = self.signapk_jar.clone();
        }
        if let Some(java) = &self.java {
            config.signer.java = java.clone();
        }
        if let Some(heap) = &self.java_heap {
            config.signer.java_heap = heap.clone();
        }
        if self.zipalign.is_some() {
            config.signer.zipalign = self.zipalign.clone();
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs.max(1);
        }
        Ok(config)
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn build_signer(config: &ResignConfig) -> Result<SignApkSigner> {
    let signapk_jar = config.signer.signapk_jar.clone().ok_or_else(|| {
        anyhow!("No signapk.jar configured: pass --signapk-jar or set signer.signapk_jar")
    })?;
    let java = resolve_tool(&config.signer.java).context("Cannot find java")?;
    let zipalign = config
        .signer
        .zipalign
        .as_deref()
        .map(resolve_tool)
        .transpose()
        .context("Cannot find zipalign")?;

    Ok(SignApkSigner::new(signapk_jar)
        .java(java)
        .java_heap(config.signer.java_heap.clone())
        .zipalign(zipalign))
}

fn password_provider(password_file: Option<&Path>) -> Result<Box<dyn PasswordProvider>> {
    let prompt = PromptPasswords::terminal();
    match password_file {
        Some(path) => {
            let file = PasswordFile::load(path)?.with_fallback(Box::new(prompt));
            Ok(Box::new(file))
        }
        None => Ok(Box::new(prompt)),
    }
}

fn run(cli: &Cli, matches: &ArgMatches) -> Result<ResignReport> {
    let config = cli.resign_config(matches)?;
    let signer = build_signer(&config)?;
    let mut provider = password_provider(cli.password_file.as_deref())?;

    let mut source = ZipEntrySource::open(&cli.input)
        .with_context(|| format!("Failed to open {}", cli.input.display()))?;

    let output_dir = match cli.output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let staging = tempfile::Builder::new()
        .prefix(".relsign-")
        .suffix(".zip.tmp")
        .tempfile_in(&output_dir)
        .with_context(|| format!("Failed to create output in {}", output_dir.display()))?;
    let mut sink = ZipEntrySink::new(BufWriter::new(staging));

    let report = resign_target_files(
        &mut source,
        &mut sink,
        &config,
        provider.as_mut(),
        &signer,
    )?;

    let staging = sink
        .finish()?
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush output archive: {}", e.error()))?;
    staging
        .persist(&cli.output)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;

    Ok(report)
}

fn print_summary(report: &ResignReport, output: &Path) {
    for warning in &report.warnings {
        println!("{} {}", "⚠".yellow().bold(), warning);
    }
    println!(
        "{} Signed {} package(s), left {} unchanged, copied {} other entries",
        "✓".green().bold(),
        report.signed.len(),
        report.skipped.len(),
        report.copied
    );
    println!("  {} Output: {}", "→".blue(), output.display());
}

fn main() -> Result<()> {
    let (cli, matches) = Cli::parse_with_matches(std::env::args_os()).unwrap_or_else(|e| e.exit());
    logging::init(cli.verbose);

    let report = run(&cli, &matches)?;
    print_summary(&report, &cli.output);
    Ok(())
}
