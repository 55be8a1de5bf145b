//! 話し言葉の数値
//!
//! 音声入力の書き起こし（"seven twenty by five sixty, qty two"）を
//! 数字表記に置き換える。

use regex::Regex;

fn unit_value(word: &str) -> Option<u64> {
    Some(match word {
        "zero" | "oh" => 0,
        "one" | "a" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        _ => return None,
    })
}

fn tens_value(word: &str) -> Option<u64> {
    Some(match word {
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    })
}

fn is_number_word(word: &str) -> bool {
    // "a" / "oh" は単独では数値とみなさない
    (unit_value(word).is_some() && word != "a" && word != "oh")
        || tens_value(word).is_some()
        || matches!(word, "hundred" | "thousand")
}

/// 数値を表す単語列を整数に変換する
///
/// - `"seven hundred twenty"` → 720
/// - `"one thousand two hundred"` → 1200
/// - `"seven twenty"` → 720（桁読み）
/// - `"eighteen"` → 18
pub fn parse_spoken_number(phrase: &str) -> Option<u64> {
    let words: Vec<String> = phrase
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|w| !w.is_empty() && *w != "and")
        .map(str::to_string)
        .collect();

    if words.is_empty() {
        return None;
    }

    // 桁読み: "seven twenty" / "five sixty" / "twelve fifty"
    if words.len() >= 2 && !words.iter().any(|w| w == "hundred" || w == "thousand") {
        let head = unit_value(&words[0]).filter(|v| *v > 0);
        if let (Some(head), Some(rest)) = (head, parse_below_hundred(&words[1..])) {
            return Some(head * 100 + rest);
        }
    }

    let mut total: u64 = 0;
    let mut current: u64 = 0;
    let mut seen = false;

    for word in &words {
        let low = current % 100;
        if let Some(v) = unit_value(word) {
            // "seven two" のような並びは数値として読まない
            if low != 0 && (low < 20 || low % 10 != 0) {
                return None;
            }
            current += v;
            seen = true;
        } else if let Some(v) = tens_value(word) {
            if low != 0 {
                return None;
            }
            current += v;
            seen = true;
        } else if word == "hundred" {
            current = current.max(1) * 100;
            seen = true;
        } else if word == "thousand" {
            total += current.max(1) * 1000;
            current = 0;
            seen = true;
        } else {
            return None;
        }
    }

    if seen {
        Some(total + current)
    } else {
        None
    }
}

fn parse_below_hundred(words: &[String]) -> Option<u64> {
    match words {
        [single] => unit_value(single)
            .filter(|v| *v >= 10)
            .or_else(|| tens_value(single)),
        [tens, unit] => {
            let t = tens_value(tens)?;
            let u = unit_value(unit).filter(|v| *v < 10)?;
            Some(t + u)
        }
        _ => None,
    }
}

/// テキスト中の数値単語列を数字に置き換える
///
/// `"two side panels seven twenty by five sixty"` → `"2 side panels 720 by 560"`
pub fn replace_spoken_numbers(text: &str) -> String {
    lazy_static::lazy_static! {
        static ref WORD_RE: Regex = Regex::new(r"[A-Za-z]+(?:-[A-Za-z]+)?|[^A-Za-z]+").unwrap();
    }

    let tokens: Vec<&str> = WORD_RE.find_iter(text).map(|m| m.as_str()).collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < tokens.len() {
        let lower = tokens[i].to_lowercase();
        let starts_number = lower
            .split('-')
            .all(|w| is_number_word(w));

        if !starts_number {
            out.push_str(tokens[i]);
            i += 1;
            continue;
        }

        // 数値単語（間の空白と "and" を含む）の連続を集める
        let mut phrase = vec![lower.clone()];
        let mut end = i + 1;
        let mut j = i + 1;
        while j + 1 < tokens.len() && tokens[j].trim().is_empty() && !tokens[j].contains('\n') {
            let next = tokens[j + 1].to_lowercase();
            let continues = next.split('-').all(|w| is_number_word(w))
                || (next == "and"
                    && tokens
                        .get(j + 3)
                        .map(|t| t.to_lowercase().split('-').all(|w| is_number_word(w)))
                        .unwrap_or(false));
            if !continues {
                break;
            }
            phrase.push(next);
            end = j + 2;
            j += 2;
        }

        match parse_spoken_number(&phrase.join(" ")) {
            Some(value) => {
                out.push_str(&value.to_string());
                i = end;
            }
            None => {
                out.push_str(tokens[i]);
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spoken_number_simple() {
        assert_eq!(parse_spoken_number("eighteen"), Some(18));
        assert_eq!(parse_spoken_number("twenty four"), Some(24));
        assert_eq!(parse_spoken_number("twenty-four"), Some(24));
    }

    #[test]
    fn test_parse_spoken_number_hundreds() {
        assert_eq!(parse_spoken_number("seven hundred twenty"), Some(720));
        assert_eq!(parse_spoken_number("seven hundred and twenty"), Some(720));
        assert_eq!(parse_spoken_number("one thousand two hundred"), Some(1200));
        assert_eq!(parse_spoken_number("hundred"), Some(100));
    }

    #[test]
    fn test_parse_spoken_number_digit_pairs() {
        assert_eq!(parse_spoken_number("seven twenty"), Some(720));
        assert_eq!(parse_spoken_number("five sixty"), Some(560));
        assert_eq!(parse_spoken_number("twelve fifty"), Some(1250));
        assert_eq!(parse_spoken_number("five sixty two"), Some(562));
    }

    #[test]
    fn test_parse_spoken_number_invalid() {
        assert_eq!(parse_spoken_number(""), None);
        assert_eq!(parse_spoken_number("panel"), None);
        assert_eq!(parse_spoken_number("seven two"), None);
    }

    #[test]
    fn test_replace_spoken_numbers() {
        assert_eq!(
            replace_spoken_numbers("two side panels seven twenty by five sixty"),
            "2 side panels 720 by 560"
        );
        assert_eq!(replace_spoken_numbers("qty four"), "qty 4");
        assert_eq!(replace_spoken_numbers("Side 720x560"), "Side 720x560");
    }

    #[test]
    fn test_replace_spoken_numbers_keeps_articles() {
        assert_eq!(replace_spoken_numbers("a shelf"), "a shelf");
    }
}
