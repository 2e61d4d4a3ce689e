use annunciator::error::ElementKind;
use annunciator::ports::{ChannelId, OutputSink, SourceId, SweepSource};
use annunciator::{AnnunciatorPanel, AnnunciatorState, PanelConfig, PanelError, PanelSnapshot};
use clap::{App, Arg};
use colored::*;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time;
use tracing::{error, info, trace, warn, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Json,
    Compact,
}

#[derive(Debug, Clone, PartialEq)]
enum OperatorCommand {
    Reset,
    Recall(bool),
    Test(bool),
    Power(String, bool),
    Environment(bool),
    Drive(String, bool),
    Hold(u16, f64),
    Release(u16),
    Status,
    Quit,
}

/// Output sink for the demo: there is no hardware, so writes are traced.
struct TraceSink;

impl OutputSink for TraceSink {
    fn write_output(&mut self, channel: ChannelId, level: bool) {
        trace!(channel = channel.0, level, "output");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("annunciator")
        .version("0.1.0")
        .author("Space Systems Engineering Team")
        .about("🚨 Master caution and system annunciator panel driver")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Panel configuration (JSON). Defaults to the built-in demo panel")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("cycles")
                .short("n")
                .long("cycles")
                .value_name("COUNT")
                .help("Stop after this many update cycles (default: run until `quit`)")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Cycle count must be a valid number".into()),
                }),
        )
        .arg(
            Arg::with_name("period")
                .short("p")
                .long("period-ms")
                .value_name("MS")
                .help("Update period in milliseconds (overrides the config)")
                .takes_value(true)
                .validator(|v| match v.parse::<u32>() {
                    Ok(ms) if ms > 0 => Ok(()),
                    _ => Err("Period must be a positive number of milliseconds".into()),
                }),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table"),
        )
        .arg(
            Arg::with_name("dump-config")
                .long("dump-config")
                .help("Print the effective configuration as JSON and exit"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable verbose logging"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match matches.value_of("config") {
        Some(path) => PanelConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => PanelConfig::demo(),
    };

    if matches.is_present("dump-config") {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let format = match matches.value_of("format") {
        Some("json") => OutputFormat::Json,
        Some("compact") => OutputFormat::Compact,
        _ => OutputFormat::Table,
    };
    let period_ms = match matches.value_of("period") {
        Some(ms) => ms.parse::<u32>()?,
        None => config.cycle_period_ms.max(1),
    };
    let max_cycles = matches.value_of("cycles").map(str::parse::<u64>).transpose()?;

    let mut panel = AnnunciatorPanel::from_config(&config)?;
    let mut source = SweepSource::new(config.sweeps.clone());
    let mut environment = true;
    let mut sink = TraceSink;

    info!(
        indicators = panel.indicators().len(),
        annunciators = panel.annunciators().len(),
        master_cautions = panel.master_cautions().len(),
        period_ms,
        "panel ready"
    );
    println!("{}", "Commands: reset | recall on|off | test on|off | power <name> on|off | drive <label> on|off | env on|off | hold <source> <value> | release <source> | status | quit".dimmed());

    let mut interval = time::interval(Duration::from_millis(u64::from(period_ms)));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let start = Instant::now();
    let mut last_snapshot: Option<PanelSnapshot> = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now_ms = start.elapsed().as_millis() as u64;
                source.advance_to(now_ms);
                panel.run_cycle(now_ms, &mut source, &environment, &mut sink);

                let snapshot = panel.snapshot();
                let changed = last_snapshot
                    .as_ref()
                    .map_or(true, |previous| snapshot.lamps_differ(previous));
                if changed {
                    render(&snapshot, format)?;
                }
                last_snapshot = Some(snapshot);

                if max_cycles.is_some_and(|limit| panel.cycle_count() >= limit) {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match parse_command(&line) {
                        Ok(OperatorCommand::Quit) => break,
                        Ok(OperatorCommand::Status) => render(&panel.snapshot(), format)?,
                        Ok(command) => {
                            if let Err(e) = apply(&mut panel, &mut source, &mut environment, command) {
                                warn!("❌ {}", e);
                            }
                        }
                        Err(e) => warn!("{}", e),
                    },
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        error!("Failed to read operator input: {}", e);
                        stdin_open = false;
                    }
                }
            }
        }
    }

    info!(cycles = panel.cycle_count(), "panel stopped");
    Ok(())
}

fn parse_switch(word: &str) -> Result<bool, String> {
    match word {
        "on" | "enable" | "true" => Ok(true),
        "off" | "disable" | "false" => Ok(false),
        other => Err(format!("expected on/off, got `{other}`")),
    }
}

fn parse_command(line: &str) -> Result<OperatorCommand, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["reset"] => Ok(OperatorCommand::Reset),
        ["recall", state] => parse_switch(state).map(OperatorCommand::Recall),
        ["test", state] => parse_switch(state).map(OperatorCommand::Test),
        ["env", state] => parse_switch(state).map(OperatorCommand::Environment),
        ["power", name @ .., state] if !name.is_empty() => {
            parse_switch(state).map(|on| OperatorCommand::Power(name.join(" "), on))
        }
        ["drive", name @ .., state] if !name.is_empty() => {
            parse_switch(state).map(|on| OperatorCommand::Drive(name.join(" "), on))
        }
        ["hold", source, value] => {
            let source = source.parse::<u16>().map_err(|e| format!("bad source id: {e}"))?;
            let value = value.parse::<f64>().map_err(|e| format!("bad value: {e}"))?;
            Ok(OperatorCommand::Hold(source, value))
        }
        ["release", source] => source
            .parse::<u16>()
            .map(OperatorCommand::Release)
            .map_err(|e| format!("bad source id: {e}")),
        ["status"] => Ok(OperatorCommand::Status),
        ["quit" | "exit"] => Ok(OperatorCommand::Quit),
        _ => Err(format!("unknown command `{}`", line.trim())),
    }
}

fn apply(
    panel: &mut AnnunciatorPanel,
    source: &mut SweepSource,
    environment: &mut bool,
    command: OperatorCommand,
) -> Result<(), PanelError> {
    match command {
        OperatorCommand::Reset => panel.reset_all(),
        OperatorCommand::Recall(mode) => panel.set_recall_all(mode),
        OperatorCommand::Test(on) => panel.set_bulb_test(on),
        OperatorCommand::Environment(on) => *environment = on,
        OperatorCommand::Power(name, on) => {
            let id = panel
                .find_power_source(&name)
                .ok_or_else(|| PanelError::UnknownLabel {
                    element: ElementKind::PowerSource,
                    label: name.clone(),
                })?;
            panel.set_power(id, on)?;
            info!(source = name.as_str(), on, "power");
        }
        OperatorCommand::Drive(name, on) => {
            let id = panel
                .find_indicator(&name)
                .ok_or_else(|| PanelError::UnknownLabel {
                    element: ElementKind::Indicator,
                    label: name.clone(),
                })?;
            if !panel.drive(id, on)? {
                warn!(indicator = name.as_str(), "indicator is range-bound, drive ignored");
            }
        }
        OperatorCommand::Hold(id, value) => source.hold(SourceId(id), value),
        OperatorCommand::Release(id) => source.release(SourceId(id)),
        OperatorCommand::Status | OperatorCommand::Quit => {}
    }
    Ok(())
}

fn lamp(lit: bool) -> ColoredString {
    if lit {
        "●".bright_yellow().bold()
    } else {
        "○".dimmed()
    }
}

fn render(snapshot: &PanelSnapshot, format: OutputFormat) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(snapshot)?),
        OutputFormat::Compact => {
            let mut line = format!("#{}", snapshot.cycle);
            for mc in &snapshot.master_cautions {
                line.push_str(&format!(" {}:{}", mc.label, lamp(mc.lit)));
            }
            for sa in &snapshot.annunciators {
                line.push_str(&format!(" {}:{}", sa.label, lamp(sa.lit)));
            }
            println!("{line}");
        }
        OutputFormat::Table => render_table(snapshot),
    }
    Ok(())
}

fn render_table(snapshot: &PanelSnapshot) {
    let mut flags = Vec::new();
    if !snapshot.environment_active {
        flags.push("ENV OFF".red().to_string());
    }
    if snapshot.bulb_test {
        flags.push("BULB TEST".bright_cyan().to_string());
    }
    println!(
        "{} {} {}",
        "═══ cycle".bright_blue().bold(),
        snapshot.cycle.to_string().bright_blue().bold(),
        flags.join(" ")
    );

    for mc in &snapshot.master_cautions {
        let label = if mc.lit { mc.label.bright_red().bold() } else { mc.label.normal() };
        println!("  {} {}", lamp(mc.lit), label);
    }

    for sa in &snapshot.annunciators {
        let state = match sa.state {
            AnnunciatorState::Idle => "idle".dimmed(),
            AnnunciatorState::Latched => "LATCHED".yellow(),
            AnnunciatorState::Recalled => "RECALL".cyan(),
        };
        let fault = if sa.has_active { "fault".red() } else { "".normal() };
        println!("    {} {:<16} {:<8} {}", lamp(sa.lit), sa.label, state, fault);
    }

    for ind in &snapshot.indicators {
        let value = ind
            .value
            .map_or_else(|| "driven".dimmed().to_string(), |v| format!("{v:>10.2}"));
        println!("      {} {:<24} {}", lamp(ind.lit), ind.label, value);
    }
}
