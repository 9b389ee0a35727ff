/// Variable resolver used during `$`-expansion. Unknown names resolve to "".
pub type Lookup<'a> = &'a dyn Fn(&str) -> String;

/// Split a line into parts separated by unquoted whitespace. A part may
/// contain whitespace if it is quoted; the quotes are kept in the part.
pub fn parse_parts(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut part = String::new();
    let mut in_quote = false;
    let mut spaced = true;
    let mut escaped = false;
    let mut quote = '\0';

    for ch in line.chars() {
        if !in_quote {
            match ch {
                ' ' | '\t' => {
                    if !spaced {
                        spaced = true;
                        if !part.is_empty() {
                            parts.push(std::mem::take(&mut part));
                        }
                    }
                    continue;
                }
                '"' | '\'' => {
                    in_quote = true;
                    quote = ch;
                    spaced = false;
                }
                _ => spaced = false,
            }
        } else {
            match ch {
                '\\' => escaped = !escaped,
                '"' | '\'' => {
                    if !escaped && quote == ch {
                        in_quote = false;
                    }
                    escaped = false;
                }
                _ => escaped = false,
            }
        }
        part.push(ch);
    }
    if !part.is_empty() {
        parts.push(part);
    }
    parts
}

/// Collapse a line to its canonical form: parts joined by single spaces.
pub fn canonical(line: &str) -> String {
    parse_parts(line).join(" ")
}

/// Quote a value the Plan 9 way: wrap in single quotes when it contains
/// whitespace, a quote or an equals sign, doubling any embedded quote.
pub fn quote(v: &str) -> String {
    if v.contains([' ', '\'', '=', '\t']) {
        format!("'{}'", v.replace('\'', "''"))
    } else {
        v.to_string()
    }
}

// one alternating unquoted/quoted run of the input
struct Segment {
    quoted: bool,
    text: String,
}

/// Unquote a string and expand its `$`-variables. The input is walked as
/// alternating unquoted and quoted runs; variables are only expanded in
/// unquoted runs, quoted runs are emitted verbatim with their quotes
/// stripped. A quote immediately reopened after closing (the `''` pair)
/// collapses to a single literal quote inside the surrounding quoted run.
pub fn unquote(input: &str, look: Option<Lookup>) -> String {
    let mut segs = vec![Segment {
        quoted: false,
        text: String::new(),
    }];
    let mut in_quote = false;
    let mut last: Option<char> = None;

    for ch in input.chars() {
        if ch == '\'' {
            in_quote = !in_quote;
            segs.push(Segment {
                quoted: in_quote,
                text: String::new(),
            });
            if in_quote && last == Some('\'') {
                // reopening right after a close: fold back into the previous
                // quoted run as a literal quote
                segs.truncate(segs.len() - 2);
                if let Some(seg) = segs.last_mut() {
                    seg.text.push('\'');
                }
                last = None;
            } else {
                last = Some('\'');
            }
            continue;
        }
        last = Some(ch);
        if let Some(seg) = segs.last_mut() {
            seg.text.push(ch);
        }
    }

    let mut out = String::new();
    for seg in &segs {
        if seg.text.is_empty() {
            continue;
        }
        if seg.quoted {
            out.push_str(&seg.text);
        } else {
            out.push_str(&expand(&seg.text, look));
        }
    }
    out
}

/// Expand `$`-variables in an unquoted run. A digit after `$` names a
/// single-character variable (capture group); otherwise the name is the
/// longest run of letters. Lookup results are themselves unquoted and
/// expanded, so definitions may reference other variables.
pub fn expand(input: &str, look: Option<Lookup>) -> String {
    let Some(look) = look else {
        return input.to_string();
    };
    let mut out = String::new();
    let mut rest = input;
    loop {
        let Some(i) = rest.find('$') else {
            out.push_str(rest);
            break;
        };
        if i + 1 >= rest.len() {
            // a trailing dollar stays as it is
            out.push_str(rest);
            break;
        }
        let tail = &rest[i + 1..];
        let first = tail.chars().next().unwrap_or('\0');
        let (key, skip) = if first.is_ascii_digit() {
            (&tail[..1], 1)
        } else {
            let n = tail
                .find(|c: char| !c.is_alphabetic())
                .unwrap_or(tail.len());
            (&tail[..n], n)
        };
        out.push_str(&rest[..i]);
        if !key.is_empty() {
            out.push_str(&unquote(&look(key), Some(look)));
        }
        rest = &rest[i + 1 + skip..];
    }
    out
}
