//! readeasy: document read-aloud and AI text transforms from the terminal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use readeasy::config::Config;
use readeasy::document::Document;
use readeasy::prefs::PreferenceStore;
use readeasy::service::{ReaderCommand, ReaderNotice, ReaderService};
use readeasy::speech::host::HostEventSender;
use readeasy::speech::{
    event_channel, NullHost, PlaybackController, SpeechHost, SpeechReport, VoiceCatalog, VoiceSelector,
};
use readeasy::transform::{TextTransformClient, TransformKind, TransformRequest};

#[derive(Parser, Debug)]
#[command(name = "readeasy", about = "Read documents aloud and simplify, summarize or translate them")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a text file aloud (interactive controls on stdin)
    Read {
        file: PathBuf,
        /// Target speech language, e.g. fr or en-GB
        #[arg(short, long)]
        language: Option<String>,
        /// Voice name (see `readeasy voices`)
        #[arg(long)]
        voice: Option<String>,
        /// Speech rate, 0.5 to 2.0
        #[arg(short, long)]
        rate: Option<f32>,
        /// Volume, 0.0 to 1.0
        #[arg(long)]
        volume: Option<f32>,
    },
    /// List voices and speech diagnostics
    Voices {
        /// Show which voice would be picked for this language
        #[arg(short, long)]
        language: Option<String>,
        /// Print the voice list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Summarize, simplify or translate a text file
    Transform {
        #[arg(value_enum)]
        kind: TransformKind,
        file: PathBuf,
        /// Target language for translate (fr, es, de, it, zh, ar, ru, ja, pt)
        #[arg(short, long)]
        target: Option<String>,
        /// Also write <name>_processed.txt into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Screen reader mode preference
    Accessibility {
        #[command(subcommand)]
        action: Option<AccessibilityAction>,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum AccessibilityAction {
    Status,
    Toggle,
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Suppress noisy ort internals
    let filter = if args.verbose {
        EnvFilter::new("debug,ort=info")
    } else {
        EnvFilter::new("info,ort=warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref());

    match args.command {
        Command::Read {
            file,
            language,
            voice,
            rate,
            volume,
        } => {
            let mut config = config;
            if let Some(language) = language {
                config.speech.language = language;
            }
            if let Some(rate) = rate {
                config.speech.rate = rate;
            }
            if let Some(volume) = volume {
                config.speech.volume = volume;
            }
            if voice.is_some() {
                config.speech.voice = voice;
            }
            read(config, file).await
        }
        Command::Voices { language, json } => voices(config, language, json).await,
        Command::Transform {
            kind,
            file,
            target,
            output,
        } => transform(config, kind, file, target, output).await,
        Command::Accessibility { action } => accessibility(action.unwrap_or(AccessibilityAction::Status)),
    }
}

// --- Speech host ---

#[cfg(feature = "kokoro")]
fn load_native_host(config: &Config, events: HostEventSender) -> Option<Arc<dyn SpeechHost>> {
    if !config.kokoro.enabled {
        return None;
    }
    info!("Loading Kokoro TTS model...");
    match readeasy::speech::kokoro::KokoroHost::load(&config.kokoro, events) {
        Ok(host) => Some(Arc::new(host)),
        Err(e) => {
            tracing::warn!("Failed to load TTS model: {e}");
            None
        }
    }
}

#[cfg(not(feature = "kokoro"))]
fn load_native_host(_config: &Config, _events: HostEventSender) -> Option<Arc<dyn SpeechHost>> {
    None
}

fn build_host(config: &Config, events: HostEventSender) -> Arc<dyn SpeechHost> {
    load_native_host(config, events).unwrap_or_else(|| {
        info!("Speech disabled, continuing without voice output");
        Arc::new(NullHost)
    })
}

// --- Commands ---

async fn read(config: Config, file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let document = Document::from_file(&file)?;
    let (events_tx, events_rx) = event_channel();
    let host = build_host(&config, events_tx);
    let catalog = VoiceCatalog::from_config(host.clone(), &config.speech);
    let controller = PlaybackController::from_config(host, catalog, &config.speech);
    let client = TextTransformClient::new(&config.transform)?;

    let (service, mut notices) = ReaderService::new(controller, client, document, events_rx);
    let (cmd_tx, cmd_rx) = mpsc::channel::<ReaderCommand>(16);
    let service_task = tokio::spawn(service.run(cmd_rx));

    eprintln!("Controls: [enter]/p play-pause, s stop, > faster, < slower, + louder, - quieter,");
    eprintln!("          v <voice>, l <language>, t <summarize|simplify|translate> [lang], r revert,");
    eprintln!("          e [dir] export, q quit");

    let mut rate = config.speech.rate;
    let mut volume = config.speech.volume;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    cmd_tx.send(ReaderCommand::Play).await?;

    loop {
        tokio::select! {
            notice = notices.recv() => {
                let Some(notice) = notice else { break };
                print_notice(&notice);
                if notice == ReaderNotice::Finished {
                    break;
                }
                if let ReaderNotice::Error(e) = &notice {
                    if !e.is_recoverable() && !stdin_open {
                        break;
                    }
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line == "q" {
                            break;
                        }
                        match parse_control(line, &mut rate, &mut volume) {
                            Some(command) => cmd_tx.send(command).await?,
                            None => eprintln!("Unknown control: {line}"),
                        }
                    }
                    Ok(None) | Err(_) => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    cmd_tx.send(ReaderCommand::Shutdown).await?;
    service_task.await?;
    Ok(())
}

fn parse_control(line: &str, rate: &mut f32, volume: &mut f32) -> Option<ReaderCommand> {
    let (key, rest) = match line.split_once(' ') {
        Some((key, rest)) => (key, rest.trim()),
        None => (line, ""),
    };
    let command = match key {
        "" | "p" => ReaderCommand::Play,
        "s" => ReaderCommand::Stop,
        ">" => {
            *rate = (*rate + 0.25).min(2.0);
            ReaderCommand::SetRate(*rate)
        }
        "<" => {
            *rate = (*rate - 0.25).max(0.5);
            ReaderCommand::SetRate(*rate)
        }
        "+" => {
            *volume = (*volume + 0.1).min(1.0);
            ReaderCommand::SetVolume(*volume)
        }
        "-" => {
            *volume = (*volume - 0.1).max(0.0);
            ReaderCommand::SetVolume(*volume)
        }
        "v" => ReaderCommand::SetVoice((!rest.is_empty()).then(|| rest.to_string())),
        "l" if !rest.is_empty() => ReaderCommand::SetLanguage(rest.to_string()),
        "t" => {
            let mut parts = rest.split_whitespace();
            let kind = parts.next()?.parse::<TransformKind>().ok()?;
            ReaderCommand::Transform {
                kind,
                target_language: parts.next().map(str::to_string),
            }
        }
        "r" => ReaderCommand::Revert,
        "e" => ReaderCommand::Export(if rest.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(rest)
        }),
        _ => return None,
    };
    Some(command)
}

fn print_notice(notice: &ReaderNotice) {
    match notice {
        ReaderNotice::Started => eprintln!("▶ Speaking"),
        ReaderNotice::Paused => eprintln!("⏸ Paused"),
        ReaderNotice::Resumed => eprintln!("▶ Resumed"),
        ReaderNotice::Finished => eprintln!("■ Finished"),
        ReaderNotice::Stopped => eprintln!("■ Stopped"),
        ReaderNotice::VoiceSubstituted(voice) => eprintln!("Using voice {voice}"),
        ReaderNotice::VoiceSwitched { from, to } => {
            eprintln!("Voice {from} failed, switched to {to}. Press play to try again.")
        }
        ReaderNotice::VoicesChanged(count) => eprintln!("{count} voices available"),
        ReaderNotice::TransformStarted(kind) => eprintln!("Running {kind}..."),
        ReaderNotice::TransformDone { kind, truncated } => {
            eprintln!("Text {} successfully!", kind.past_tense());
            if *truncated {
                eprintln!("(input was truncated before sending)");
            }
        }
        ReaderNotice::Exported(path) => eprintln!("Saved {}", path.display()),
        ReaderNotice::Error(e) => eprintln!("Error: {}", e.user_message()),
    }
}

async fn voices(config: Config, language: Option<String>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (events_tx, _events_rx) = event_channel();
    let host = build_host(&config, events_tx);
    let catalog = VoiceCatalog::from_config(host, &config.speech);

    // Give late-enumerating hosts the full poll schedule
    let subscription = catalog.subscribe(|_| {});
    let settle = config.speech.poll_delays().into_iter().max().unwrap_or_default();
    tokio::time::sleep(settle + Duration::from_millis(50)).await;
    drop(subscription);

    let voices = catalog.voices();
    if json {
        println!("{}", serde_json::to_string_pretty(&voices)?);
        return Ok(());
    }

    print!("{}", SpeechReport::build(catalog.is_supported(), &voices, catalog.policy()));

    let language = language.unwrap_or(config.speech.language);
    let mut selector = VoiceSelector::new(catalog.policy().clone());
    match selector.select(&voices, &language) {
        Some(selection) if selection.substituted => {
            println!("Selected for '{language}': {} (substitute)", selection.voice)
        }
        Some(selection) => println!("Selected for '{language}': {}", selection.voice),
        None => println!("No voice available for '{language}'"),
    }
    Ok(())
}

async fn transform(
    config: Config,
    kind: TransformKind,
    file: PathBuf,
    target: Option<String>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut document = Document::from_file(&file)?;
    let client = TextTransformClient::new(&config.transform)?;
    let request = TransformRequest {
        kind,
        text: document.active_text().to_string(),
        target_language: target,
    };

    let result = match client.transform(&request).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Processing error: {}", e.user_message());
            return Err(e.into());
        }
    };

    if result.truncated {
        eprintln!("Input was longer than {} chars and was truncated", client.limit_for(kind));
    }
    println!("{}", result.text);

    if let Some(dir) = output {
        document.apply(kind, result);
        let path = document.export(&dir)?;
        eprintln!("Saved {}", path.display());
    }
    Ok(())
}

fn accessibility(action: AccessibilityAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = PreferenceStore::open_default()?;
    let message = match action {
        AccessibilityAction::Status => {
            if store.screen_reader_mode() {
                "Screen reader mode is on"
            } else {
                "Screen reader mode is off"
            }
        }
        AccessibilityAction::Toggle => store.toggle_screen_reader_mode()?,
        AccessibilityAction::On => {
            store.set_screen_reader_mode(true)?;
            readeasy::prefs::announcement(true)
        }
        AccessibilityAction::Off => {
            store.set_screen_reader_mode(false)?;
            readeasy::prefs::announcement(false)
        }
    };
    println!("{message}");
    Ok(())
}
