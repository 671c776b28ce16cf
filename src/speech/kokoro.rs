//! Kokoro speech host: text → phonemes → ONNX inference → rodio playback.
//!
//! Pipeline per utterance:
//! 1. Text → sentences (split on .!?), keeping char offsets
//! 2. Sentence → phonemes (misaki-rs G2P)
//! 3. Phonemes → token IDs (tokenizer.json vocabulary)
//! 4. Token IDs + voice style + rate → ONNX inference → f32 audio (24kHz)
//! 5. Audio → rodio Sink at the utterance volume; word boundaries are
//!    estimated from the sink position
//!
//! All engine state lives on one worker thread. The host itself only holds
//! the job queue, the pause gate over the active sink and the id of the
//! utterance that is allowed to play. A pause between sentences, while the
//! next one is still being synthesized, sticks: the next sink starts paused.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use ndarray::{Array2, Array3};
use ndarray_npy::NpzReader;
use ort::value::Tensor;
use parking_lot::Mutex;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use tracing::{debug, info, warn};

use super::host::{HostEvent, HostEventSender, SpeechHost, Utterance, UtteranceId};
use super::voice::Voice;
use crate::config::KokoroConfig;
use crate::error::{ReadEasyError, Result};

const SAMPLE_RATE: u32 = 24000;
const MAX_TOKENS: usize = 510; // Voice style array first dimension
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_VOICE: &str = "af_heart";

/// Audio output the pause gate can hold.
trait AudioSink {
    fn pause(&self);
    fn play(&self);
    fn stop(&self);
}

impl AudioSink for Sink {
    fn pause(&self) {
        Sink::pause(self);
    }

    fn play(&self) {
        Sink::play(self);
    }

    fn stop(&self) {
        Sink::stop(self);
    }
}

/// Pause state plus the sink currently playing, if any.
///
/// The flag outlives individual sinks so a pause requested while no sink is
/// installed applies to the next one.
struct PauseGate<S> {
    paused: AtomicBool,
    active: Mutex<Option<S>>,
}

impl<S: AudioSink> PauseGate<S> {
    fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            active: Mutex::new(None),
        }
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        let active = self.active.lock();
        self.paused.store(true, Ordering::SeqCst);
        if let Some(sink) = active.as_ref() {
            sink.pause();
        }
    }

    fn resume(&self) {
        let active = self.active.lock();
        self.paused.store(false, Ordering::SeqCst);
        if let Some(sink) = active.as_ref() {
            sink.play();
        }
    }

    /// Drop the active sink and clear the pause flag.
    fn cancel(&self) {
        let mut active = self.active.lock();
        self.paused.store(false, Ordering::SeqCst);
        if let Some(sink) = active.take() {
            sink.stop();
        }
    }

    /// Install `sink` unless `allowed` says the utterance was cancelled. The
    /// sink is paused first when a pause is pending. Returns false when
    /// the sink was stopped instead.
    fn install(&self, sink: S, allowed: impl FnOnce() -> bool) -> bool {
        let mut active = self.active.lock();
        if !allowed() {
            sink.stop();
            return false;
        }
        if self.is_paused() {
            sink.pause();
        }
        *active = Some(sink);
        true
    }

    fn with_active<R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        self.active.lock().as_ref().map(f)
    }

    fn clear(&self) {
        *self.active.lock() = None;
    }
}

/// State shared between the host handle and the worker.
struct Shared {
    /// Utterance allowed to play; 0 means none
    current: AtomicU64,
    gate: PauseGate<Sink>,
}

impl Shared {
    fn is_current(&self, id: UtteranceId) -> bool {
        self.current.load(Ordering::SeqCst) == id
    }
}

/// Native Kokoro speech host.
pub struct KokoroHost {
    voices: Vec<Voice>,
    jobs: mpsc::Sender<Utterance>,
    shared: Arc<Shared>,
}

impl KokoroHost {
    /// Load the model, tokenizer, voices and audio output on a dedicated
    /// worker thread. Blocks until loading finished.
    pub fn load(config: &KokoroConfig, events: HostEventSender) -> Result<Self> {
        let paths = EnginePaths {
            model: config.model_file(),
            voices: config.voices_file(),
            tokenizer: config.tokenizer_file(),
        };
        let shared = Arc::new(Shared {
            current: AtomicU64::new(0),
            gate: PauseGate::new(),
        });
        let (jobs_tx, jobs_rx) = mpsc::channel::<Utterance>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<Vec<String>, String>>();

        let worker_shared = shared.clone();
        std::thread::Builder::new()
            .name("kokoro".into())
            .spawn(move || {
                let engine = match Engine::load(&paths) {
                    Ok(engine) => engine,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(engine.voice_names()));
                engine.run(jobs_rx, &worker_shared, &events);
                debug!("Kokoro worker stopped");
            })?;

        let names = ready_rx
            .recv()
            .map_err(|_| ReadEasyError::Unsupported("Kokoro worker exited during load".into()))?
            .map_err(|e| ReadEasyError::Unsupported(format!("Kokoro unavailable: {e}")))?;

        let voices = names
            .iter()
            .map(|name| {
                let voice = Voice::new(name.clone(), kokoro_language(name), true);
                if name == DEFAULT_VOICE {
                    voice.with_default()
                } else {
                    voice
                }
            })
            .collect();

        Ok(Self {
            voices,
            jobs: jobs_tx,
            shared,
        })
    }
}

impl SpeechHost for KokoroHost {
    fn is_supported(&self) -> bool {
        true
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(&self, utterance: Utterance) {
        self.shared.current.store(utterance.id, Ordering::SeqCst);
        if self.jobs.send(utterance).is_err() {
            warn!("Kokoro worker is gone, utterance dropped");
        }
    }

    fn pause(&self) {
        self.shared.gate.pause();
    }

    fn resume(&self) {
        self.shared.gate.resume();
    }

    fn cancel(&self) {
        self.shared.current.store(0, Ordering::SeqCst);
        self.shared.gate.cancel();
    }
}

// --- Engine (worker thread only) ---

struct EnginePaths {
    model: std::path::PathBuf,
    voices: std::path::PathBuf,
    tokenizer: std::path::PathBuf,
}

/// Loaded voice style data, shape (510, 256).
struct VoiceData {
    styles: Array2<f32>,
}

struct Engine {
    session: ort::session::Session,
    phonemizer: misaki_rs::G2P,
    vocab: HashMap<char, i64>,
    voices: HashMap<String, VoiceData>,
    // Kept alive for the worker's lifetime
    output_stream: OutputStream,
}

enum Played {
    Finished,
    Cancelled,
}

impl Engine {
    fn load(paths: &EnginePaths) -> std::result::Result<Self, String> {
        let t0 = Instant::now();

        info!("Loading tokenizer from {}", paths.tokenizer.display());
        let vocab = load_tokenizer(&paths.tokenizer)?;
        info!("Tokenizer loaded: {} tokens", vocab.len());

        info!("Loading voices from {}", paths.voices.display());
        let voices = load_voices(&paths.voices)?;
        info!("Loaded {} voices", voices.len());

        info!("Loading ONNX model from {}", paths.model.display());
        let session = ort::session::Session::builder()
            .map_err(|e| format!("Failed to create ONNX session builder: {e}"))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| format!("Failed to set optimization level: {e}"))?
            .with_intra_threads(4)
            .map_err(|e| format!("Failed to set thread count: {e}"))?
            .commit_from_file(&paths.model)
            .map_err(|e| format!("Failed to load ONNX model: {e}"))?;

        let phonemizer = misaki_rs::G2P::new(misaki_rs::Language::EnglishUS);

        let output_stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| format!("Failed to open audio output: {e}"))?;

        info!("Kokoro loaded in {}ms", t0.elapsed().as_millis());
        Ok(Self {
            session,
            phonemizer,
            vocab,
            voices,
            output_stream,
        })
    }

    fn voice_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.voices.keys().cloned().collect();
        names.sort();
        names
    }

    fn run(mut self, jobs: mpsc::Receiver<Utterance>, shared: &Shared, events: &HostEventSender) {
        for job in jobs {
            if !shared.is_current(job.id) {
                debug!("Skipping cancelled utterance {}", job.id);
                continue;
            }
            self.speak(&job, shared, events);
        }
    }

    fn speak(&mut self, job: &Utterance, shared: &Shared, events: &HostEventSender) {
        let voice_name = job
            .voice
            .as_ref()
            .map(|v| v.name.clone())
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());
        if !self.voices.contains_key(&voice_name) {
            let _ = events.send(HostEvent::error(job.id, format!("voice not found: {voice_name}")));
            return;
        }

        let sentences = split_sentences(&job.text);
        let _ = events.send(HostEvent::start(job.id));

        for (i, sentence) in sentences.iter().enumerate() {
            if !shared.is_current(job.id) {
                info!("Cancelled before sentence {}/{}", i + 1, sentences.len());
                return;
            }

            let t_gen = Instant::now();
            let samples = match self.generate_audio(&sentence.text, &voice_name, job.rate) {
                Ok(s) => s,
                Err(e) => {
                    warn!("TTS generation failed for sentence {}: {e}", i + 1);
                    let _ = events.send(HostEvent::error(job.id, e));
                    return;
                }
            };
            let gen_ms = t_gen.elapsed().as_millis();

            if samples.is_empty() {
                continue;
            }
            if !shared.is_current(job.id) {
                info!("Cancelled after generating sentence {}/{}", i + 1, sentences.len());
                return;
            }

            let t_play = Instant::now();
            match self.play_audio(samples, job, sentence, shared, events) {
                Played::Finished => {}
                Played::Cancelled => {
                    info!("Cancelled during playback of sentence {}/{}", i + 1, sentences.len());
                    return;
                }
            }
            debug!(
                "Sentence {}/{}: gen={gen_ms}ms play={:.1}s",
                i + 1,
                sentences.len(),
                t_play.elapsed().as_secs_f64()
            );
        }

        if shared.is_current(job.id) {
            let _ = events.send(HostEvent::end(job.id));
        }
    }

    /// Generate audio samples for a single sentence.
    fn generate_audio(&mut self, text: &str, voice_name: &str, speed: f32) -> std::result::Result<Vec<f32>, String> {
        let (phonemes, _tokens) = self
            .phonemizer
            .g2p(text)
            .map_err(|e| format!("Phonemization failed: {e}"))?;

        if phonemes.is_empty() {
            return Ok(Vec::new());
        }

        let mut token_ids: Vec<i64> = Vec::with_capacity(phonemes.len() + 2);
        token_ids.push(0);
        token_ids.extend(phonemes.chars().filter_map(|ch| self.vocab.get(&ch).copied()));
        token_ids.push(0);

        let n_tokens = token_ids.len().min(MAX_TOKENS);
        token_ids.truncate(n_tokens);

        let voice_data = self
            .voices
            .get(voice_name)
            .ok_or_else(|| format!("Voice not found: {voice_name}"))?;
        let style_idx = n_tokens.saturating_sub(2).min(voice_data.styles.nrows() - 1);
        let style_vec: Vec<f32> = voice_data.styles.row(style_idx).to_vec();

        let tokens_tensor = Tensor::from_array(
            Array2::from_shape_vec((1, n_tokens), token_ids)
                .map_err(|e| format!("Failed to create tokens tensor: {e}"))?,
        )
        .map_err(|e| format!("Failed to create tokens ort tensor: {e}"))?;
        let style_tensor = Tensor::from_array(
            Array2::from_shape_vec((1, 256), style_vec)
                .map_err(|e| format!("Failed to create style tensor: {e}"))?,
        )
        .map_err(|e| format!("Failed to create style ort tensor: {e}"))?;
        let speed_tensor = Tensor::from_array(ndarray::Array1::from_vec(vec![speed]))
            .map_err(|e| format!("Failed to create speed ort tensor: {e}"))?;

        let outputs = self
            .session
            .run(ort::inputs![
                "tokens" => tokens_tensor,
                "style" => style_tensor,
                "speed" => speed_tensor
            ])
            .map_err(|e| format!("ONNX inference failed: {e}"))?;

        let first_output = outputs.iter().next().ok_or("No output tensor from model")?;
        let (_shape, audio_slice) = first_output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| format!("Failed to extract audio tensor: {e}"))?;

        let samples: Vec<f32> = audio_slice.to_vec();
        debug!(
            "Generated {} samples ({:.1}s)",
            samples.len(),
            samples.len() as f32 / SAMPLE_RATE as f32
        );
        Ok(samples)
    }

    /// Play one sentence, emitting estimated word boundaries as it goes.
    fn play_audio(
        &self,
        samples: Vec<f32>,
        job: &Utterance,
        sentence: &Sentence,
        shared: &Shared,
        events: &HostEventSender,
    ) -> Played {
        let duration = Duration::from_secs_f64(samples.len() as f64 / SAMPLE_RATE as f64);
        let sink = Sink::connect_new(self.output_stream.mixer());
        sink.set_volume(job.volume);
        if !shared.gate.install(sink, || shared.is_current(job.id)) {
            return Played::Cancelled;
        }
        // Appended after install so a pending pause holds before any audio
        if shared
            .gate
            .with_active(|sink| sink.append(SamplesBuffer::new(1, SAMPLE_RATE, samples)))
            .is_none()
        {
            return Played::Cancelled;
        }

        let words = word_starts(&sentence.text);
        let mut emitted = 0;
        loop {
            if !shared.is_current(job.id) {
                return Played::Cancelled;
            }

            let (done, position) = match shared.gate.with_active(|sink| (sink.empty(), sink.get_pos())) {
                Some(state) => state,
                None => return Played::Cancelled,
            };

            let reached = if done {
                words.len()
            } else {
                words_reached(&words, sentence.len, position, duration)
            };
            for &offset in &words[emitted..reached.max(emitted)] {
                let _ = events.send(HostEvent::word(job.id, sentence.start + offset));
            }
            emitted = emitted.max(reached);

            if done {
                shared.gate.clear();
                return Played::Finished;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

// --- Helper functions ---

/// Language tag from the Kokoro voice naming convention (`af_heart`, `ff_siwis`, ...).
pub fn kokoro_language(voice_name: &str) -> &'static str {
    match voice_name.chars().next() {
        Some('a') => "en-US",
        Some('b') => "en-GB",
        Some('e') => "es-ES",
        Some('f') => "fr-FR",
        Some('h') => "hi-IN",
        Some('i') => "it-IT",
        Some('j') => "ja-JP",
        Some('p') => "pt-BR",
        Some('z') => "zh-CN",
        _ => "und",
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Sentence {
    /// Char offset in the utterance text
    start: usize,
    /// Length in chars
    len: usize,
    text: String,
}

/// Split text into sentences at .!? followed by whitespace.
fn split_sentences(text: &str) -> Vec<Sentence> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0;

    let push = |from: usize, to: usize, sentences: &mut Vec<Sentence>| {
        let slice = &chars[from..to];
        let lead = slice.iter().take_while(|c| c.is_whitespace()).count();
        let body: String = slice[lead..].iter().collect();
        let body = body.trim_end().to_string();
        if !body.is_empty() {
            sentences.push(Sentence {
                start: from + lead,
                len: body.chars().count(),
                text: body,
            });
        }
    };

    for i in 0..chars.len() {
        let terminal = matches!(chars[i], '.' | '!' | '?');
        if terminal && chars.get(i + 1).is_some_and(|c| c.is_whitespace()) {
            push(start, i + 1, &mut sentences);
            start = i + 1;
        }
    }
    push(start, chars.len(), &mut sentences);

    sentences
}

/// Char offsets of each word start within `text`.
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_word = false;
    for (i, c) in text.chars().enumerate() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            starts.push(i);
            in_word = true;
        }
    }
    starts
}

/// Number of words whose start lies within the played fraction of the sentence.
fn words_reached(words: &[usize], len: usize, position: Duration, duration: Duration) -> usize {
    if duration.is_zero() || len == 0 {
        return words.len();
    }
    let fraction = (position.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0);
    let spoken = (fraction * len as f64) as usize;
    words.iter().take_while(|&&w| w <= spoken).count()
}

/// Load tokenizer vocabulary from tokenizer.json.
fn load_tokenizer(path: &Path) -> std::result::Result<HashMap<char, i64>, String> {
    let contents = fs::read_to_string(path).map_err(|e| format!("Failed to read tokenizer: {e}"))?;
    parse_vocab(&contents)
}

fn parse_vocab(contents: &str) -> std::result::Result<HashMap<char, i64>, String> {
    let data: serde_json::Value =
        serde_json::from_str(contents).map_err(|e| format!("Failed to parse tokenizer JSON: {e}"))?;

    let vocab = data["model"]["vocab"]
        .as_object()
        .ok_or("Missing model.vocab in tokenizer.json")?;

    let mut map = HashMap::new();
    for (token, id) in vocab {
        let id = id.as_i64().ok_or("Token ID is not an integer")?;
        if let Some(ch) = token.chars().next() {
            map.insert(ch, id);
        }
    }
    Ok(map)
}

/// Load all voice styles from an NPZ file.
fn load_voices(path: &Path) -> std::result::Result<HashMap<String, VoiceData>, String> {
    let file = fs::File::open(path).map_err(|e| format!("Failed to open voices file: {e}"))?;
    let mut npz = NpzReader::new(file).map_err(|e| format!("Failed to read NPZ voices file: {e}"))?;

    let names: Vec<String> = npz
        .names()
        .map_err(|e| format!("Failed to list NPZ entries: {e}"))?
        .into_iter()
        .map(|n| n.trim_end_matches(".npy").to_string())
        .collect();

    let mut voices = HashMap::new();
    for name in names {
        let arr: Array3<f32> = npz
            .by_name(&format!("{name}.npy"))
            .map_err(|e| format!("Failed to read voice '{name}': {e}"))?;

        // (510, 1, 256) → (510, 256)
        let (dim0, dim2) = (arr.shape()[0], arr.shape()[2]);
        let styles = arr
            .into_shape_with_order((dim0, dim2))
            .map_err(|e| format!("Failed to reshape voice '{name}': {e}"))?;
        voices.insert(name, VoiceData { styles });
    }
    Ok(voices)
}
