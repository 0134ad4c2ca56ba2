//! Splits a human-typed command line into an argument vector.
//!
//! The scanner understands whitespace separation, single and double quotes,
//! and `\` / `` ` `` escapes. It does no expansion of any kind: `$(...)`,
//! pipes and globs come through as literal words.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Spaces,
    Word,
    Quote(char),
}

fn is_escape(ch: char) -> bool {
    ch == '\\' || ch == '`'
}

fn is_quote(ch: char) -> bool {
    ch == '\'' || ch == '"'
}

fn push_escaped(word: &mut String, escape: char, next: Option<char>) {
    if let Some(next) = next {
        word.push(escape);
        word.push(next);
    }
}

/// Tokenizes `command`.
///
/// - Runs of whitespace outside quotes separate words.
/// - Quotes group whitespace into a single word; `""` yields an empty word.
/// - An escape character binds the next character to the word, even
///   whitespace or a quote. Both characters are kept. Escapes are literal
///   inside single quotes. A trailing escape is dropped.
/// - Any quote characters left in a word are removed afterwards.
///
/// ```
/// use neighbor::execution::argv::tokenize;
///
/// assert_eq!(tokenize(r#"a b "c d e f""#), vec!["a", "b", "c d e f"]);
/// ```
pub fn tokenize(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut blank_ok = false;
    let mut phase = Phase::Spaces;
    let mut chars = command.chars();

    while let Some(ch) = chars.next() {
        match phase {
            Phase::Spaces if ch.is_whitespace() => {}
            Phase::Spaces | Phase::Word => {
                if ch.is_whitespace() {
                    if blank_ok || !word.is_empty() {
                        words.push(std::mem::take(&mut word));
                    }
                    blank_ok = false;
                    phase = Phase::Spaces;
                    continue;
                }
                phase = Phase::Word;
                if is_quote(ch) {
                    blank_ok = true;
                    phase = Phase::Quote(ch);
                } else if is_escape(ch) {
                    push_escaped(&mut word, ch, chars.next());
                } else {
                    word.push(ch);
                }
            }
            Phase::Quote(quote) => {
                if ch == quote {
                    phase = Phase::Word;
                } else if is_escape(ch) && quote != '\'' {
                    push_escaped(&mut word, ch, chars.next());
                } else {
                    word.push(ch);
                }
            }
        }
    }

    if phase != Phase::Spaces && (blank_ok || !word.is_empty()) {
        words.push(word);
    }

    words
        .into_iter()
        .map(|w| w.chars().filter(|c| !is_quote(*c)).collect())
        .collect()
}
