use clap::{Parser, ValueEnum};
use crossbeam_channel as channel;
use std::time::{Duration, Instant};

use midi_input_controller::{
    midi::MidirTransport, ActiveDeviceController, Event, NoteEvent, PitchRange,
};

const POLL_PERIOD: Duration = Duration::from_secs(1);

/// Prints the notes and pedal changes received from a MIDI input device.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// List the installed MIDI input devices and exit.
    #[arg(short, long)]
    list: bool,

    /// Name of the device to monitor.
    #[arg(short, long)]
    device: Option<String>,

    /// Name under which this client registers with the MIDI system.
    #[arg(long, default_value = "midi-input-monitor")]
    client_name: String,

    /// Window of pitches whose frequency is reported.
    #[arg(long, value_enum, default_value_t = Range::Full)]
    range: Range,

    /// Stop after this many seconds.
    #[arg(long)]
    seconds: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Range {
    /// C-1 to G9.
    Full,
    /// D#3 to D#6.
    Concert,
    /// A3 to A5.
    TwoOctaves,
}

impl From<Range> for PitchRange {
    fn from(range: Range) -> Self {
        match range {
            Range::Full => PitchRange::FULL,
            Range::Concert => PitchRange::CONCERT,
            Range::TwoOctaves => PitchRange::TWO_OCTAVES,
        }
    }
}

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    match run(Args::parse()) {
        Ok(()) => log::info!("Exiting"),
        Err(err) => {
            log::error!("Error: {}", err);
            for cause in err.chain().skip(1) {
                log::error!("\t{}", cause);
            }
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let transport = MidirTransport::try_new(args.client_name.as_str())?;
    log::debug!("Registered MIDI client {}", transport.client_name());
    let ctrl = ActiveDeviceController::new(transport);

    let device = match args.device {
        Some(device) if !args.list => device,
        _ => {
            let names = ctrl.list_device_names()?;
            if names.is_empty() {
                println!("No MIDI input devices");
            }
            for name in names {
                println!("{name}");
            }

            return Ok(());
        }
    };

    if !ctrl.activate(&device)? {
        anyhow::bail!("No MIDI input device named {device}");
    }

    let (event_tx, event_rx) = channel::unbounded();
    ctrl.dispatcher().forward_to(event_tx);

    let range = PitchRange::from(args.range);
    let deadline = args
        .seconds
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        let timeout = match deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(POLL_PERIOD),
            None => POLL_PERIOD,
        };

        match event_rx.recv_timeout(timeout) {
            Ok(event) => report(&event, range),
            Err(channel::RecvTimeoutError::Timeout) => {
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    break;
                }

                if !ctrl.registry().device_exists(&device)? {
                    log::warn!("{device} is gone");
                    break;
                }
            }
            Err(channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    ctrl.deactivate();

    Ok(())
}

fn report(event: &Event, range: PitchRange) {
    let print_note = |label: &str, note: &NoteEvent| {
        let freq = match range.frequency_of(note.pitch) {
            Some(freq) => format!("{freq:.2} Hz"),
            None => "out of range".to_string(),
        };

        println!(
            "{:>10.3}s {:<10} {:<8} {:<4} vel {:>3} ({freq})",
            note.time,
            note.channel.to_string(),
            label,
            note.pitch.to_string(),
            note.velocity,
        );
    };

    match event {
        Event::NoteOn(on) => print_note("Note On", on),
        Event::NoteOff(off) => print_note("Note Off", off),
        Event::SustainChange(control) | Event::ReverbChange(control) => {
            let label = if matches!(event, Event::SustainChange(_)) {
                "Sustain"
            } else {
                "Reverb"
            };

            println!(
                "{:>10.3}s {:<10} {:<8} {:>3}",
                control.time,
                control.channel.to_string(),
                label,
                control.value,
            );
        }
    }
}
