use std::error::Error;

use regex::Regex;

/// Boxed static error type
pub type Err = Box<dyn Error + 'static>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

pub(crate) use regex_static;

/// Chinese numerals that count as digits next to the unicode decimal digits.
pub const CHINESE_DIGITS: &str = "一二三四五六七八九十百千万";

pub fn is_digit(c: char) -> bool {
  c.is_numeric() || CHINESE_DIGITS.contains(c)
}

/// Replaces every digit of `word` (see [`is_digit`]) with `0`.
///
/// ```
/// assert_eq!(latent_chart::utils::normalize_digits("2019年三月"), "0000年0月");
/// ```
pub fn normalize_digits(word: &str) -> String {
  regex_static!(DIGIT, r"[\p{N}一二三四五六七八九十百千万]");
  DIGIT.replace_all(word, "0").into_owned()
}

/// Normalizes `word` when `normalize` is set, otherwise returns it unchanged.
pub fn maybe_normalize(word: &str, normalize: bool) -> String {
  if normalize {
    normalize_digits(word)
  } else {
    word.to_string()
  }
}
