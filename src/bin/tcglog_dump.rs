#[cfg(all(feature = "fast-alloc", not(windows)))]
use tikv_jemallocator::Jemalloc;

#[cfg(all(feature = "fast-alloc", not(windows)))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[cfg(all(feature = "fast-alloc", windows))]
#[global_allocator]
static GLOBAL: rpmalloc::RpMalloc = rpmalloc::RpMalloc;

use anyhow::{Context, Result, bail, format_err};
use clap::{Arg, ArgAction, ArgMatches, Command};
use dialoguer::Confirm;
use log::Level;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tcglog::decode::DEFAULT_SYSTEMD_EFI_STUB_PCR;
use tcglog::{AlgorithmId, Event, LogOptions, ParserSettings, PcrIndex, TcgLogParser, hexdump};

const DEFAULT_LOG_PATH: &str = "/sys/kernel/security/tpm0/binary_bios_measurements";

#[derive(Copy, Clone, PartialEq, Eq)]
pub enum TcgLogOutputFormat {
    Text,
    Json,
    JsonL,
}

struct TcgLogDump {
    parser_settings: ParserSettings,
    input: PathBuf,
    algorithm: AlgorithmId,
    output_format: TcgLogOutputFormat,
    output: Box<dyn Write>,
    verbose: bool,
    hexdump: bool,
    vardata_hexdump: bool,
    extract_data_prefix: Option<String>,
    extract_vardata_prefix: Option<String>,
    pcrs: Vec<PcrIndex>,
    verbosity_level: Option<Level>,
}

impl TcgLogDump {
    pub fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let input = PathBuf::from(
            matches
                .get_one::<String>("INPUT")
                .map(String::as_str)
                .unwrap_or(DEFAULT_LOG_PATH),
        );

        let alg_name = matches
            .get_one::<String>("alg")
            .map(String::as_str)
            .unwrap_or("sha1");
        let algorithm = AlgorithmId::from_name(alg_name)
            .ok_or_else(|| format_err!("Unrecognized algorithm `{}`", alg_name))?;

        let output_format = match matches
            .get_one::<String>("output-format")
            .map(String::as_str)
            .unwrap_or("text")
        {
            "json" => TcgLogOutputFormat::Json,
            "jsonl" => TcgLogOutputFormat::JsonL,
            _ => TcgLogOutputFormat::Text,
        };

        let verbosity_level = match matches.get_count("debug") {
            0 => None,
            1 => Some(Level::Info),
            2 => Some(Level::Debug),
            3 => Some(Level::Trace),
            _ => {
                eprintln!("using more than -ddd does not affect verbosity level");
                Some(Level::Trace)
            }
        };

        let output: Box<dyn Write> = if let Some(path) = matches.get_one::<String>("output-target")
        {
            let file = Self::create_output_file(path, !matches.get_flag("no-confirm-overwrite"))
                .with_context(|| {
                    format!("An error occurred while creating output file at `{}`", path)
                })?;
            Box::new(BufWriter::new(file))
        } else {
            Box::new(BufWriter::new(io::stdout()))
        };

        let log_options = LogOptions::new()
            .with_grub(matches.get_flag("with-grub"))
            .with_systemd_efi_stub(matches.get_flag("with-systemd-efi-stub"))
            .systemd_efi_stub_pcr(
                matches
                    .get_one::<PcrIndex>("systemd-efi-stub-pcr")
                    .copied()
                    .unwrap_or(DEFAULT_SYSTEMD_EFI_STUB_PCR),
            );

        Ok(TcgLogDump {
            parser_settings: ParserSettings::new().log_options(log_options),
            input,
            algorithm,
            output_format,
            output,
            verbose: matches.get_flag("verbose"),
            hexdump: matches.get_flag("hexdump"),
            vardata_hexdump: matches.get_flag("vardatahexdump"),
            extract_data_prefix: matches.get_one::<String>("extract-data").cloned(),
            extract_vardata_prefix: matches.get_one::<String>("extract-vardata").cloned(),
            pcrs: matches
                .get_many::<PcrIndex>("pcrs")
                .map(|values| values.copied().collect())
                .unwrap_or_default(),
            verbosity_level,
        })
    }

    /// Main entry point for `TcgLogDump`
    pub fn run(&mut self) -> Result<()> {
        self.try_to_initialize_logging();

        let parser = if self.input == Path::new("-") {
            TcgLogParser::from_read(io::stdin().lock())
                .context("Failed to read log from stdin")?
        } else {
            TcgLogParser::from_path(&self.input)
                .with_context(|| format!("Failed to open log file {}", self.input.display()))?
        };

        let mut log = parser
            .with_configuration(self.parser_settings.clone())
            .parse_log()
            .context("Failed to parse log file")?;

        if !log.algorithms.contains(&self.algorithm) {
            bail!(
                "The log doesn't contain entries for the {} digest algorithm",
                self.algorithm
            );
        }

        log.events.retain(|event| self.should_display_event(event));

        match self.output_format {
            TcgLogOutputFormat::Text => {
                for event in &log.events {
                    self.dump_event(event)?;
                }
            }
            TcgLogOutputFormat::JsonL => {
                for event in &log.events {
                    writeln!(self.output, "{}", event.to_json(false)?)?;
                }
            }
            TcgLogOutputFormat::Json => {
                serde_json::to_writer_pretty(&mut self.output, &log)?;
                writeln!(self.output)?;
            }
        }

        for event in &log.events {
            self.extract_event_data(event)?;
        }

        self.output.flush()?;
        Ok(())
    }

    fn should_display_event(&self, event: &Event) -> bool {
        self.pcrs.is_empty() || self.pcrs.contains(&event.pcr_index)
    }

    fn dump_event(&mut self, event: &Event) -> Result<()> {
        let digest = event
            .digest(self.algorithm)
            .map(|d| d.to_string())
            .unwrap_or_default();
        let mut line = format!("{:>2} {} {}", event.pcr_index, digest, event.event_type);

        if self.verbose || self.hexdump {
            let data = event.data.to_string();
            if !data.is_empty() {
                line.push_str(&format!(" [ {} ]", data));
            }
        }

        if self.hexdump {
            line.push_str("\n  Event data:\n  ");
            line.push_str(&indent(hexdump(event.data.bytes()).trim_end()));
        }

        if self.vardata_hexdump {
            if let Some(var) = event.data.as_efi_variable() {
                line.push_str("\n  EFI variable data:\n  ");
                line.push_str(&indent(hexdump(&var.variable_data).trim_end()));
            }
        }

        writeln!(self.output, "{}", line)?;
        Ok(())
    }

    fn extract_event_data(&self, event: &Event) -> Result<()> {
        if let Some(prefix) = &self.extract_data_prefix {
            let path = format!("{}-{}-{}", prefix, event.pcr_index, event.index);
            fs::write(&path, event.data.bytes())
                .with_context(|| format!("Failed to write event data to {}", path))?;
        }

        if let Some(prefix) = &self.extract_vardata_prefix {
            if let Some(var) = event.data.as_efi_variable() {
                let path = format!("{}-{}-{}", prefix, event.pcr_index, event.index);
                fs::write(&path, &var.variable_data)
                    .with_context(|| format!("Failed to write EFI variable data to {}", path))?;
            }
        }

        Ok(())
    }

    /// If `prompt` is passed, will display a confirmation prompt before overwriting files.
    fn create_output_file(path: impl AsRef<Path>, prompt: bool) -> Result<File> {
        let p = path.as_ref();

        if p.is_dir() {
            bail!(
                "There is a directory at {}, refusing to overwrite",
                p.display()
            );
        }

        if p.exists() {
            if prompt {
                match Confirm::new()
                    .with_prompt(format!(
                        "Are you sure you want to override output file at {}",
                        p.display()
                    ))
                    .default(false)
                    .interact()
                {
                    Ok(true) => Ok(File::create(p)?),
                    Ok(false) => bail!("Cancelled"),
                    Err(e) => Err(format_err!(
                        "Failed to write confirmation prompt to term caused by\n{}",
                        e
                    )),
                }
            } else {
                Ok(File::create(p)?)
            }
        } else {
            // Ok to assume p is not an existing directory
            match p.parent() {
                Some(parent) => {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        fs::create_dir_all(parent)?;
                    }
                    Ok(File::create(p)?)
                }
                None => bail!("Output file cannot be root."),
            }
        }
    }

    fn try_to_initialize_logging(&self) {
        if let Some(level) = self.verbosity_level {
            match simplelog::WriteLogger::init(
                level.to_level_filter(),
                simplelog::Config::default(),
                io::stderr(),
            ) {
                Ok(_) => {}
                Err(e) => eprintln!("Failed to initialize logging: {:?}", e),
            };
        }
    }
}

/// Indents every line after the first by two spaces.
fn indent(s: &str) -> String {
    s.replace('\n', "\n  ")
}

fn main() -> Result<()> {
    let matches = Command::new("TCG Log Dump")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility to dump TCG (TPM) event logs")
        .arg(
            Arg::new("INPUT")
                .help(format!(
                    "Path to the log, `-` for stdin. Defaults to {}",
                    DEFAULT_LOG_PATH
                )),
        )
        .arg(
            Arg::new("alg")
                .long("alg")
                .value_parser(["sha1", "sha256", "sha384", "sha512"])
                .default_value("sha1")
                .help("Name of the hash algorithm to display"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Display details of event data"),
        )
        .arg(
            Arg::new("hexdump")
                .short('x')
                .long("hexdump")
                .action(ArgAction::SetTrue)
                .help("Display hexdump of event data"),
        )
        .arg(
            Arg::new("vardatahexdump")
                .long("vardatahexdump")
                .action(ArgAction::SetTrue)
                .help("Display hexdump of EFI variable data"),
        )
        .arg(
            Arg::new("extract-data")
                .long("extract-data")
                .value_name("PREFIX")
                .help("Extract event data to individual files named <PREFIX>-<pcr>-<index>"),
        )
        .arg(
            Arg::new("extract-vardata")
                .long("extract-vardata")
                .value_name("PREFIX")
                .help("Extract EFI variable data to individual files named <PREFIX>-<pcr>-<index>"),
        )
        .arg(
            Arg::new("with-grub")
                .long("with-grub")
                .action(ArgAction::SetTrue)
                .help("Interpret measurements made by GRUB to PCRs 8 and 9"),
        )
        .arg(
            Arg::new("with-systemd-efi-stub")
                .long("with-systemd-efi-stub")
                .action(ArgAction::SetTrue)
                .help("Interpret measurements made by systemd's EFI stub Linux loader"),
        )
        .arg(
            Arg::new("systemd-efi-stub-pcr")
                .long("systemd-efi-stub-pcr")
                .value_parser(clap::value_parser!(PcrIndex))
                .default_value("8")
                .help("Specify the PCR that systemd's EFI stub Linux loader measures to"),
        )
        .arg(
            Arg::new("pcrs")
                .long("pcrs")
                .value_parser(clap::value_parser!(PcrIndex))
                .value_delimiter(',')
                .action(ArgAction::Append)
                .help("Display events associated with the specified PCRs. Can be specified multiple times"),
        )
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("format")
                .value_parser(["text", "json", "jsonl"])
                .default_value("text")
                .help("Sets the output format")
                .long_help(
                    "Sets the output format:
    \"text\"  - one line per event.
    \"json\"  - the whole log as a JSON document.
    \"jsonl\" - one JSON object per event.",
                ),
        )
        .arg(
            Arg::new("output-target")
                .long("output")
                .short('f')
                .help("Writes output to the file specified instead of stdout, errors will still be printed to stderr. \
                       Will ask for confirmation before overwriting files, to allow overwriting, pass `--no-confirm-overwrite`. \
                       Will create parent directories if needed."),
        )
        .arg(
            Arg::new("no-confirm-overwrite")
                .long("no-confirm-overwrite")
                .action(ArgAction::SetTrue)
                .help("When set, will not ask for confirmation before overwriting files, useful for automation"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .action(ArgAction::Count)
                .help("-d - info, -dd - debug, -ddd - trace. \
                       Trace output is only available in debug builds"),
        )
        .get_matches();

    TcgLogDump::from_cli_matches(&matches)?.run()
}
