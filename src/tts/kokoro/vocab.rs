//! Kokoro phoneme vocabulary.
//!
//! Symbol-to-id table of the Kokoro v0.19 text encoder. Id `0` is the pad
//! token placed at both ends of every sequence and has no symbol.

use std::collections::HashMap;

/// Pad token id.
pub const PAD_ID: i64 = 0;

const PAD: char = '$';
const PUNCTUATION_SYMBOLS: &str = ";:,.!?¡¿—…\"«»\u{201c}\u{201d} ";
const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const LETTERS_IPA: &str = "ɑɐɒæɓʙβɔɕçɗɖðʤəɘɚɛɜɝɞɟʄɡɠɢʛɦɧħɥʜɨɪʝɭɬɫɮʟɱɯɰŋɳɲɴøɵɸθœɶʘɹɺɾɻʀʁɽʂʃʈʧʉʊʋⱱʌɣɤʍχʎʏʑʐʒʔʡʕʢǀǁǂǃˈˌːˑʼʴʰʱʲʷˠˤ˞↓↑→↗↘'\u{0329}'ᵻ";

/// Punctuation marks the model understands; everything else in the input
/// is phonemized.
pub const PUNCTUATION: &[char] = &[
    ';', ':', ',', '.', '!', '?', '¡', '¿', '—', '…', '"', '«', '»', '\u{201c}', '\u{201d}',
];

/// Build the symbol-to-id table.
///
/// Ids are positions in the concatenated symbol list. The apostrophe is
/// listed twice and keeps its later position.
pub fn vocab() -> HashMap<char, i64> {
    std::iter::once(PAD)
        .chain(PUNCTUATION_SYMBOLS.chars())
        .chain(LETTERS.chars())
        .chain(LETTERS_IPA.chars())
        .enumerate()
        .filter(|&(_, c)| c != PAD)
        .map(|(id, c)| (c, id as i64))
        .collect()
}

/// Map phonemes to token ids, dropping symbols outside the vocabulary.
pub fn tokenize(phonemes: &str, vocab: &HashMap<char, i64>) -> Vec<i64> {
    phonemes
        .chars()
        .filter_map(|c| vocab.get(&c).copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_fit_the_encoder() {
        let v = vocab();
        let mut ids: Vec<i64> = v.values().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), v.len());
        assert!(ids.iter().all(|&id| id != PAD_ID));
        assert_eq!(ids.last().copied(), Some(177));
        assert!(!v.contains_key(&PAD));
    }

    #[test]
    fn key_mappings() {
        let v = vocab();
        assert_eq!(v.get(&'a'), Some(&43));
        assert_eq!(v.get(&' '), Some(&16));
        assert_eq!(v.get(&'ɪ'), Some(&102));
        assert_eq!(v.get(&'ˈ'), Some(&156));
        assert_eq!(v.get(&'.'), Some(&4));
        assert_eq!(v.get(&'ɹ'), Some(&123));
        assert_eq!(v.get(&'ᵻ'), Some(&177));
    }

    #[test]
    fn guillemets_and_capitals_use_v0_19_positions() {
        let v = vocab();
        assert_eq!(v.get(&'«'), Some(&12));
        assert_eq!(v.get(&'»'), Some(&13));
        assert_eq!(v.get(&'A'), Some(&17));
        assert_eq!(v.get(&'H'), Some(&24));
        assert_eq!(v.get(&'Z'), Some(&42));
        assert!(!v.contains_key(&'('));
        assert!(!v.contains_key(&'ᵊ'));
        assert!(!v.contains_key(&'ʣ'));
    }

    #[test]
    fn espeak_only_symbols_are_known() {
        let v = vocab();
        assert_eq!(v.get(&'ʑ'), Some(&145));
        assert_eq!(v.get(&'ɫ'), Some(&106));
        assert_eq!(v.get(&'ɦ'), Some(&96));
        assert_eq!(v.get(&'ʉ'), Some(&134));
        assert_eq!(v.get(&'↑'), Some(&170));
        assert_eq!(v.get(&'\''), Some(&176));
    }

    #[test]
    fn every_punctuation_mark_has_an_id() {
        let v = vocab();
        for p in PUNCTUATION {
            assert!(v.contains_key(p), "missing id for {p:?}");
        }
    }

    #[test]
    fn tokenize_known_chars() {
        let v = vocab();
        assert_eq!(tokenize("hə", &v), vec![50, 83]);
    }

    #[test]
    fn tokenize_skips_unknown() {
        let v = vocab();
        // digits are not in the table; 'ɡ' (U+0261) is.
        assert_eq!(tokenize("1ɡ2", &v), vec![92]);
        assert!(tokenize("", &v).is_empty());
    }
}
