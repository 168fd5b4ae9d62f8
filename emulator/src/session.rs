use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use thc_core::cut::{CutParameters, CutRequest};
use thc_core::status::{StatusFormatter, StatusProvider};

use crate::bench::{Bench, BenchOutput, BenchProfile};

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "start",
        "start [V=<volts>] [D=<ms>] [H=<mm>] [I=<mm>] - fire the torch and wait for transfer",
    ),
    (
        "stop",
        "stop [after]                  - drop the torch now or once queued motion ends",
    ),
    (
        "lock",
        "lock | unlock                 - lock or unlock the torch output",
    ),
    (
        "thc",
        "thc on|off                    - request height control",
    ),
    (
        "dryrun",
        "dryrun on|off                 - run cuts without firing the torch",
    ),
    (
        "accel",
        "accel <steps/s2>              - set the height controller acceleration limit",
    ),
    (
        "run",
        "run <ms>                      - advance simulated time",
    ),
    (
        "arc",
        "arc <volts>                   - set the simulated arc voltage at start height",
    ),
    (
        "status",
        "status                        - display torch, arc, thc and cut lines",
    ),
    (
        "help",
        "help [topic]                  - show help for a command",
    ),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Cut,
    ArcLoss,
    Overrun,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Cut => "transcripts/emulator-cut.log",
            TranscriptProfile::ArcLoss => "transcripts/emulator-arc-loss.log",
            TranscriptProfile::Overrun => "transcripts/emulator-overrun.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Cut => "THC emulator cut transcript",
            TranscriptProfile::ArcLoss => "THC emulator arc loss transcript",
            TranscriptProfile::Overrun => "THC emulator Z overrun transcript",
        }
    }

    /// Bench behaviour selected by the profile.
    pub fn bench(self) -> BenchProfile {
        match self {
            TranscriptProfile::Cut => BenchProfile::default(),
            TranscriptProfile::ArcLoss => BenchProfile {
                arc_lasts_ms: Some(1_200),
                ..BenchProfile::default()
            },
            TranscriptProfile::Overrun => BenchProfile {
                z_top_limit: 1_200,
                start_z: 1_000,
                surface_z: 850,
                ..BenchProfile::default()
            },
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("cut") {
            Ok(Self::Cut)
        } else if tag.eq_ignore_ascii_case("arc-loss") {
            Ok(Self::ArcLoss)
        } else if tag.eq_ignore_ascii_case("overrun") {
            Ok(Self::Overrun)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

pub struct Session {
    bench: Bench,
    transcript: TranscriptLogger,
}

impl Session {
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        Ok(Self {
            bench: Bench::new(profile.bench()),
            transcript,
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let at = self.bench.now_ms();
        self.transcript.append_line(at, TranscriptRole::Host, trimmed)?;

        let mut words = trimmed.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = words.collect();
        let mut out = BenchOutput::default();

        match command.as_str() {
            "help" => self.help(args.first().copied(), &mut out),
            "start" => match parse_request(&args) {
                Ok(request) => self.start(request, &mut out),
                Err(message) => out.lines.push(format!("ERR syntax {message}")),
            },
            "stop" => match args.first().map(|value| value.to_ascii_lowercase()).as_deref() {
                None => self.bench.stop(&mut out),
                Some("after") => self.bench.stop_after_move(&mut out),
                Some(_) => out.lines.push("ERR syntax expected `stop [after]`".to_string()),
            },
            "lock" => self.bench.lock(&mut out),
            "unlock" => self.bench.unlock(&mut out),
            "thc" => match parse_switch(&args) {
                Some(enabled) => {
                    self.bench.request_thc(enabled, &mut out);
                    out.lines.push(format!("OK thc request={}", on_off(enabled)));
                }
                None => out.lines.push("ERR syntax expected `thc on|off`".to_string()),
            },
            "dryrun" => match parse_switch(&args) {
                Some(enabled) => {
                    self.bench.set_dry_run(enabled, &mut out);
                    out.lines.push(format!("OK dryrun={}", on_off(enabled)));
                }
                None => out.lines.push("ERR syntax expected `dryrun on|off`".to_string()),
            },
            "run" => match args.first().map(|value| value.parse::<u64>()) {
                Some(Ok(millis)) => self.run(millis, &mut out),
                _ => out.lines.push("ERR syntax expected `run <ms>`".to_string()),
            },
            "accel" => match args.first().map(|value| value.parse::<u32>()) {
                Some(Ok(steps_per_s2)) if steps_per_s2 > 0 => {
                    self.bench.set_max_acceleration(steps_per_s2);
                    out.lines.push(format!("OK accel={steps_per_s2}"));
                }
                _ => out.lines.push("ERR syntax expected `accel <steps/s2>`".to_string()),
            },
            "arc" => match args.first().map(|value| value.parse::<u16>()) {
                Some(Ok(volts)) => {
                    self.bench.set_arc_volts(volts);
                    out.lines.push(format!("OK arc={volts}V"));
                }
                _ => out.lines.push("ERR syntax expected `arc <volts>`".to_string()),
            },
            "status" => self.status(&mut out),
            other => out.lines.push(format!("ERR unknown command `{other}`")),
        }

        self.record_output(&out.lines)?;
        Ok(out.lines)
    }

    fn start(&mut self, request: CutRequest, out: &mut BenchOutput) {
        if let Err(err) = CutParameters::validate(request) {
            out.lines.push(format!("WARN {err}, using default"));
        }
        out.lines.push(format!("OK start {}", CutParameters::resolve(request)));
        self.bench.start(request, out);
    }

    fn run(&mut self, millis: u64, out: &mut BenchOutput) {
        if self.bench.halted() {
            out.lines.push("ERR halted".to_string());
            return;
        }
        self.bench.run(millis, out);
        out.lines.push(format!(
            "OK t={}ms z={} torch={}",
            self.bench.now_ms(),
            self.bench.z_position(),
            self.bench.ignition_state()
        ));
    }

    fn status(&mut self, out: &mut BenchOutput) {
        let Some(snapshot) = self.bench.snapshot() else {
            out.lines.push("ERR status unavailable".to_string());
            return;
        };
        let formatter = StatusFormatter::new(&snapshot);
        let mut line = String::new();
        if formatter.write_torch_line(&mut line).is_ok() {
            out.lines.push(std::mem::take(&mut line));
        }
        if formatter.write_arc_line(&mut line).is_ok() {
            out.lines.push(std::mem::take(&mut line));
        }
        if formatter.write_thc_line(&mut line).is_ok() {
            out.lines.push(line);
        }
        out.lines.push(format!("cut {}", self.bench.parameters()));
    }

    fn help(&mut self, topic: Option<&str>, out: &mut BenchOutput) {
        match topic {
            Some(target) => {
                if let Some((_, detail)) = HELP_TOPICS
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(target))
                {
                    out.lines.push((*detail).to_string());
                } else {
                    out.lines.push(format!("No help available for `{target}`."));
                    out.lines
                        .push(format!("Available topics: {}", help_topic_list()));
                }
            }
            None => {
                out.lines.push("Available commands:".to_string());
                for (_, detail) in HELP_TOPICS {
                    out.lines.push(format!("  {detail}"));
                }
                out.lines
                    .push("Type `help <topic>` for a specific command.".to_string());
            }
        }
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let at = self.bench.now_ms();
        for line in lines {
            self.transcript
                .append_line(at, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

/// Parses `V=`, `D=`, `H=` and `I=` words; heights are in millimetres.
fn parse_request(args: &[&str]) -> Result<CutRequest, String> {
    let mut request = CutRequest::default();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            return Err(format!("expected KEY=VALUE, found `{arg}`"));
        };
        match key.to_ascii_uppercase().as_str() {
            "V" => request.voltage = Some(parse_number(key, value)?),
            "D" => request.pierce_delay_ms = Some(parse_number(key, value)?),
            "H" => request.cut_height_cmm = Some(parse_millimetres(key, value)?),
            "I" => request.initial_height_cmm = Some(parse_millimetres(key, value)?),
            _ => return Err(format!("unknown parameter `{key}`")),
        }
    }
    Ok(request)
}

fn parse_number(key: &str, value: &str) -> Result<u16, String> {
    value
        .parse::<u16>()
        .map_err(|_| format!("invalid value for {key}: `{value}`"))
}

/// Converts millimetres with up to two decimals to hundredths.
fn parse_millimetres(key: &str, value: &str) -> Result<u16, String> {
    let invalid = || format!("invalid height for {key}: `{value}`");
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if fraction.len() > 2 {
        return Err(invalid());
    }
    let whole: u16 = whole.parse().map_err(|_| invalid())?;
    let fraction: u16 = if fraction.is_empty() {
        0
    } else {
        let digits: u16 = fraction.parse().map_err(|_| invalid())?;
        if fraction.len() == 1 { digits * 10 } else { digits }
    };
    whole
        .checked_mul(100)
        .and_then(|value| value.checked_add(fraction))
        .ok_or_else(invalid)
}

fn parse_switch(args: &[&str]) -> Option<bool> {
    match args.first().map(|value| value.to_ascii_lowercase()).as_deref() {
        Some("on") => Some(true),
        Some("off") => Some(false),
        _ => None,
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

fn help_topic_list() -> String {
    let mut buffer = String::new();
    for (index, (name, _)) in HELP_TOPICS.iter().enumerate() {
        if index > 0 {
            buffer.push_str(", ");
        }
        buffer.push_str(name);
    }
    buffer
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds of simulated time"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(&mut self, at_ms: u64, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(self.writer, "[+{at_ms:>6} ms] {} {line}", role.prefix())?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thc_core::cut::CutParameterError;

    #[test]
    fn start_words_become_a_request() {
        let request = parse_request(&["V=110", "d=250", "H=1.2", "I=4"]).expect("parse");
        assert_eq!(
            request,
            CutRequest {
                voltage: Some(110),
                pierce_delay_ms: Some(250),
                cut_height_cmm: Some(120),
                initial_height_cmm: Some(400),
            }
        );
    }

    #[test]
    fn malformed_start_words_are_rejected() {
        assert!(parse_request(&["V"]).is_err());
        assert!(parse_request(&["X=1"]).is_err());
        assert!(parse_request(&["H=1.234"]).is_err());
        assert!(parse_request(&["V=abc"]).is_err());
    }

    #[test]
    fn out_of_band_start_falls_back_with_warning() {
        assert_eq!(
            CutParameters::validate(CutRequest {
                voltage: Some(20),
                ..CutRequest::default()
            }),
            Err(CutParameterError::VoltageOutOfRange(20))
        );
    }
}
