//! Grapheme-to-phoneme front-end for Kokoro.
//!
//! English goes through `misaki-rs`; every other language is handed to an
//! `espeak-ng` subprocess. Text is normalized first (smart quotes, CJK
//! punctuation, markdown), and punctuation the model understands is kept
//! in place around the phonemized runs.

use super::vocab::PUNCTUATION;
use crate::config::PhonemizerBackend;
use crate::error::{Result, SpeakError};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::debug;

/// Which G2P path a language tag resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Misaki { british: bool },
    Espeak { voice: String },
}

#[derive(Default)]
struct MisakiCache {
    us: Option<misaki_rs::G2P>,
    gb: Option<misaki_rs::G2P>,
}

/// Converts text to Kokoro phoneme strings.
pub struct Phonemizer {
    backend: PhonemizerBackend,
    espeak_program: String,
    misaki: Mutex<MisakiCache>,
}

impl Phonemizer {
    /// Create a phonemizer for the given backend selection.
    pub fn new(backend: PhonemizerBackend, espeak_program: impl Into<String>) -> Self {
        Self {
            backend,
            espeak_program: espeak_program.into(),
            misaki: Mutex::new(MisakiCache::default()),
        }
    }

    /// Convert `text` in language `lang` to a phoneme string.
    ///
    /// # Errors
    ///
    /// Returns an error if the language is unsupported by the selected
    /// backend, the G2P step fails, or it yields no phonemes.
    pub fn phonemize(&self, text: &str, lang: &str) -> Result<String> {
        let normalized = normalize_text(text);
        let phonemes = match self.route(lang)? {
            Route::Misaki { british } => self.misaki(&normalized, british)?,
            Route::Espeak { voice } => self.espeak(&normalized, &voice)?,
        };
        let phonemes = phonemes.trim().to_owned();
        if phonemes.is_empty() {
            return Err(SpeakError::Tts(
                "phonemization produced empty output".into(),
            ));
        }
        debug!("phonemized ({lang}): \"{phonemes}\"");
        Ok(phonemes)
    }

    fn route(&self, lang: &str) -> Result<Route> {
        let tag = lang.trim().to_ascii_lowercase().replace('_', "-");
        if tag.is_empty() {
            return Err(SpeakError::Tts("language tag is empty".into()));
        }
        let english = match tag.as_str() {
            "en" | "en-us" | "a" => Some(false),
            "en-gb" | "b" => Some(true),
            _ => None,
        };

        match (self.backend, english) {
            (PhonemizerBackend::Espeak, _) | (PhonemizerBackend::Auto, None) => {
                Ok(Route::Espeak { voice: tag })
            }
            (PhonemizerBackend::Auto | PhonemizerBackend::Misaki, Some(british)) => {
                Ok(Route::Misaki { british })
            }
            (PhonemizerBackend::Misaki, None) => Err(SpeakError::Tts(format!(
                "language '{lang}' is not supported by the misaki phonemizer"
            ))),
        }
    }

    fn misaki(&self, text: &str, british: bool) -> Result<String> {
        let mut cache = self
            .misaki
            .lock()
            .map_err(|_| SpeakError::Tts("misaki phonemizer lock poisoned".into()))?;
        let slot = if british { &mut cache.gb } else { &mut cache.us };
        let g2p = slot.get_or_insert_with(|| {
            let lang = if british {
                misaki_rs::Language::EnglishGB
            } else {
                misaki_rs::Language::EnglishUS
            };
            misaki_rs::G2P::new(lang)
        });
        let (phonemes, _tokens) = g2p
            .g2p(text)
            .map_err(|e| SpeakError::Tts(format!("phonemization failed: {e}")))?;
        Ok(expand_misaki_shorthand(&phonemes))
    }

    fn espeak(&self, text: &str, voice: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len() * 2);
        for segment in split_punctuation(text) {
            match segment {
                Segment::Punct(p) => out.push(p),
                Segment::Text(run) => {
                    let trimmed = run.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if run.starts_with(char::is_whitespace) && !out.is_empty() && !out.ends_with(' ')
                    {
                        out.push(' ');
                    }
                    let ipa = self.run_espeak(trimmed, voice)?;
                    out.push_str(&clean_espeak_ipa(&ipa));
                }
            }
        }
        Ok(out)
    }

    /// Run `espeak-ng -q --ipa -v <voice>` with the text on stdin.
    fn run_espeak(&self, text: &str, voice: &str) -> Result<String> {
        let mut child = Command::new(&self.espeak_program)
            .args(["-q", "--ipa", "-v", voice])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SpeakError::Tts(format!(
                    "failed to run phonemizer '{}': {e}",
                    self.espeak_program
                ))
            })?;

        // espeak streams output while reading, so stdin is fed from its own
        // thread while this one drains stdout.
        let stdin = child.stdin.take();
        let input = text.to_owned();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes())?;
            }
            Ok(())
        });

        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .map_err(|_| SpeakError::Tts("phonemizer input thread panicked".into()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeakError::Tts(format!(
                "phonemizer '{}' failed: {}",
                self.espeak_program,
                stderr.trim()
            )));
        }
        written?;

        String::from_utf8(output.stdout)
            .map_err(|_| SpeakError::Tts("phonemizer emitted non-utf8 output".into()))
    }
}

/// A run of plain text or a single punctuation mark.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Punct(char),
}

fn split_punctuation(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        if PUNCTUATION.contains(&ch) {
            if start < i {
                segments.push(Segment::Text(&text[start..i]));
            }
            segments.push(Segment::Punct(ch));
            start = i + ch.len_utf8();
        }
    }
    if start < text.len() {
        segments.push(Segment::Text(&text[start..]));
    }
    segments
}

/// Collapse espeak's line-per-clause output and map symbols Kokoro was not
/// trained on to their closest neighbours.
fn clean_espeak_ipa(ipa: &str) -> String {
    ipa.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('ʲ', "j")
        .replace('r', "ɹ")
        .replace('x', "k")
        .replace('ɬ', "l")
}

/// Rewrite misaki's single-letter diphthongs and small schwa as the IPA
/// sequences the v0.19 vocabulary was trained on.
fn expand_misaki_shorthand(phonemes: &str) -> String {
    let mut out = String::with_capacity(phonemes.len() + 8);
    for ch in phonemes.chars() {
        match ch {
            'A' => out.push_str("eɪ"),
            'I' => out.push_str("aɪ"),
            'W' => out.push_str("aʊ"),
            'Y' => out.push_str("ɔɪ"),
            'O' => out.push_str("oʊ"),
            'Q' => out.push_str("əʊ"),
            'ᵊ' => out.push('ə'),
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Text normalization
// ---------------------------------------------------------------------------

/// Normalize text before G2P.
///
/// 1. Smart/curly quotes and dashes → ASCII
/// 2. Full-width CJK punctuation → ASCII
/// 3. Markdown `*` and heading `#` markers stripped
pub fn normalize_text(text: &str) -> String {
    let text = normalize_quotes(text);
    let text = normalize_cjk_punctuation(&text);
    strip_markdown(&text)
}

fn normalize_quotes(text: &str) -> String {
    text.replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2014}', '\u{2013}'], " - ")
}

fn normalize_cjk_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '。' | '．' => '.',
            '、' | '，' => ',',
            '！' => '!',
            '？' => '?',
            '：' => ':',
            '；' => ';',
            '「' | '」' | '『' | '』' => '"',
            '\u{3000}' => ' ',
            other => other,
        })
        .collect()
}

fn strip_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        let line_content = if trimmed.starts_with('#') {
            trimmed.trim_start_matches('#').trim_start()
        } else {
            line
        };
        result.extend(line_content.chars().filter(|&ch| ch != '*'));
        result.push('\n');
    }
    if result.ends_with('\n') {
        result.pop();
    }
    result
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_smart_quotes_and_dashes() {
        assert_eq!(normalize_quotes("I\u{2019}ve"), "I've");
        assert_eq!(
            normalize_quotes("She said \u{201C}hi\u{201D}"),
            "She said \"hi\""
        );
        assert_eq!(normalize_quotes("word\u{2014}word"), "word - word");
    }

    #[test]
    fn test_cjk_punctuation() {
        assert_eq!(
            normalize_cjk_punctuation("こんにちは、世界。元気？"),
            "こんにちは,世界.元気?"
        );
    }

    #[test]
    fn test_strip_markdown() {
        assert_eq!(strip_markdown("## Hello World"), "Hello World");
        assert_eq!(strip_markdown("This is **bold**"), "This is bold");
        assert_eq!(strip_markdown("a\n# b"), "a\nb");
    }

    #[test]
    fn test_split_keeps_punctuation_order() {
        assert_eq!(
            split_punctuation("hello, world."),
            vec![
                Segment::Text("hello"),
                Segment::Punct(','),
                Segment::Text(" world"),
                Segment::Punct('.'),
            ]
        );
        assert!(split_punctuation("").is_empty());
        assert_eq!(split_punctuation("!?"), vec![Segment::Punct('!'), Segment::Punct('?')]);
    }

    #[test]
    fn test_clean_espeak_ipa() {
        assert_eq!(clean_espeak_ipa(" kˈoʊ\n  ɬrˈʲ x\n"), "kˈoʊ lɹˈj k");
    }

    #[test]
    fn test_misaki_shorthand_expands_to_ipa() {
        assert_eq!(expand_misaki_shorthand("həlˈO"), "həlˈoʊ");
        assert_eq!(expand_misaki_shorthand("nˈIs dˈA"), "nˈaɪs dˈeɪ");
        assert_eq!(expand_misaki_shorthand("bˈYz nˈW ɡˈQ"), "bˈɔɪz nˈaʊ ɡˈəʊ");
        assert_eq!(expand_misaki_shorthand("ᵊ"), "ə");
    }

    #[test]
    fn test_route_auto() {
        let p = Phonemizer::new(PhonemizerBackend::Auto, "espeak-ng");
        assert_eq!(p.route("en-us").unwrap(), Route::Misaki { british: false });
        assert_eq!(p.route("EN_GB").unwrap(), Route::Misaki { british: true });
        assert_eq!(
            p.route("ja").unwrap(),
            Route::Espeak {
                voice: "ja".into()
            }
        );
    }

    #[test]
    fn test_route_forced_backends() {
        let espeak = Phonemizer::new(PhonemizerBackend::Espeak, "espeak-ng");
        assert_eq!(
            espeak.route("en-us").unwrap(),
            Route::Espeak {
                voice: "en-us".into()
            }
        );

        let misaki = Phonemizer::new(PhonemizerBackend::Misaki, "espeak-ng");
        assert!(misaki.route("ja").is_err());
        assert!(misaki.route("  ").is_err());
    }

    #[test]
    fn test_missing_espeak_program_is_tts_error() {
        let p = Phonemizer::new(PhonemizerBackend::Espeak, "neurospeak-no-such-espeak");
        let err = p.phonemize("konnichiwa", "ja").unwrap_err();
        assert!(matches!(err, SpeakError::Tts(_)));
        assert!(err.to_string().contains("neurospeak-no-such-espeak"));
    }

    #[test]
    fn test_punctuation_only_text_skips_subprocess() {
        // No text runs means espeak is never spawned, so a bogus program is fine.
        let p = Phonemizer::new(PhonemizerBackend::Espeak, "neurospeak-no-such-espeak");
        assert_eq!(p.phonemize("...", "ja").unwrap(), "...");
    }

    /// Stand-in for espeak-ng that echoes stdin, ignoring its arguments.
    #[cfg(unix)]
    fn echo_program(dir: &std::path::Path) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("echo-espeak.sh");
        std::fs::write(&path, "#!/bin/sh\nexec cat\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn test_long_unpunctuated_run_does_not_block_on_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let program = echo_program(dir.path());
        let text = "a".repeat(1 << 20);

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let p = Phonemizer::new(PhonemizerBackend::Espeak, program);
            let _ = tx.send(p.phonemize(&text, "ja"));
        });
        let phonemes = rx
            .recv_timeout(std::time::Duration::from_secs(60))
            .expect("phonemizer stalled on a long input")
            .unwrap();
        assert_eq!(phonemes.len(), 1 << 20);
    }

    #[cfg(unix)]
    #[test]
    fn test_echo_program_keeps_punctuation_order() {
        let dir = tempfile::tempdir().unwrap();
        let p = Phonemizer::new(PhonemizerBackend::Espeak, echo_program(dir.path()));
        assert_eq!(p.phonemize("ab, cd.", "ja").unwrap(), "ab, cd.");
    }
}
