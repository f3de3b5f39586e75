/// Streaming parser for relaxed JSON
///
/// Single pass over a byte buffer holding one JSON object. Every terminal
/// value is reported through a callback together with its full structural
/// path. The only auxiliary memory is the nesting stack, bounded by the
/// caller-supplied maximum depth and allocated once per parse.
///
/// Dialect extensions over RFC 8259:
/// - `//` starts a comment running to the end of the line; comments are
///   permitted between any two tokens and after the root object
/// - a trailing comma before `}` or `]` is accepted
///
/// Strings and keys are not decoded here; see [`RawStr::unescape`].
use crate::json::escape::RawStr;
use crate::json::path::{Frame, Path};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("no input to parse")]
    NoInput,

    /// Also returned when the nesting stack for `max_depth` cannot be allocated.
    #[error("maximum nesting depth of {max_depth} exceeded")]
    DepthExceeded { max_depth: usize },

    /// 1-based byte offset of the first malformed byte.
    #[error("syntax error at byte {offset}")]
    Syntax { offset: usize },
}

/// Terminal JSON value. Strings borrow from the parsed buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Integer(i64),
    Double(f64),
    String(RawStr<'a>),
    Bool(bool),
    Null,
}

/// Callback verdict: keep going or stop the parse early (reported as success).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Begin,
    InComment,
    FindValue,
    InObject,
    InObjectName,
    InValue,
    InArray,
    FindColon,
    FindComma,
    Finished,
}

fn syntax(at: usize) -> ParseError {
    ParseError::Syntax { offset: at + 1 }
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

fn starts_value(byte: u8) -> bool {
    matches!(byte, b'"' | b'-' | b'0'..=b'9' | b't' | b'f' | b'n')
}

/// Parse `input`, invoking `on_leaf` once per terminal value in document order.
///
/// Returns `Ok(())` when the document is well formed or when the callback
/// returned [`Flow::Stop`]. There is no partial result on error.
pub fn parse<'a, F>(input: &'a [u8], max_depth: usize, on_leaf: F) -> Result<(), ParseError>
where
    F: FnMut(&Path<'_, 'a>, Value<'a>) -> Flow,
{
    if input.is_empty() {
        return Err(ParseError::NoInput);
    }
    if max_depth == 0 {
        return Err(ParseError::DepthExceeded { max_depth });
    }

    let mut stack = Vec::new();
    stack
        .try_reserve_exact(max_depth)
        .map_err(|_| ParseError::DepthExceeded { max_depth })?;

    Parser {
        input,
        max_depth,
        stack,
        state: State::Begin,
        resume: State::Begin,
        key_start: 0,
        on_leaf,
    }
    .run()
}

struct Parser<'a, F> {
    input: &'a [u8],
    max_depth: usize,
    stack: Vec<Frame<'a>>,
    state: State,
    // State to return to when the current comment ends.
    resume: State,
    key_start: usize,
    on_leaf: F,
}

impl<'a, F> Parser<'a, F>
where
    F: FnMut(&Path<'_, 'a>, Value<'a>) -> Flow,
{
    fn run(mut self) -> Result<(), ParseError> {
        let input = self.input;
        let mut i = 0;

        while i < input.len() {
            let byte = input[i];
            match self.state {
                State::Begin => match byte {
                    b if is_whitespace(b) => {}
                    b'/' => i = self.enter_comment(i)?,
                    b'{' => {
                        self.push(Frame::Object(None))?;
                        self.state = State::InObject;
                    }
                    _ => return Err(syntax(i)),
                },

                State::InComment => {
                    if byte == b'\n' || byte == b'\r' {
                        self.state = self.resume;
                    }
                }

                State::InObject => match byte {
                    b if is_whitespace(b) => {}
                    b'/' => i = self.enter_comment(i)?,
                    b'"' => {
                        self.key_start = i + 1;
                        self.state = State::InObjectName;
                    }
                    b'}' => self.close(i, byte)?,
                    _ => return Err(syntax(i)),
                },

                State::InObjectName => match byte {
                    b'\\' => i = scan_escape(input, i)?,
                    b'\n' | b'\r' => return Err(syntax(i)),
                    b'"' => {
                        let key = RawStr::new(&input[self.key_start..i]);
                        if let Some(Frame::Object(slot)) = self.stack.last_mut() {
                            *slot = Some(key);
                        }
                        self.state = State::FindColon;
                    }
                    _ => {}
                },

                State::FindColon => match byte {
                    b if is_whitespace(b) => {}
                    b'/' => i = self.enter_comment(i)?,
                    b':' => self.state = State::FindValue,
                    _ => return Err(syntax(i)),
                },

                State::FindValue => match byte {
                    b if is_whitespace(b) => {}
                    b'/' => i = self.enter_comment(i)?,
                    b'{' => {
                        self.push(Frame::Object(None))?;
                        self.state = State::InObject;
                    }
                    b'[' => {
                        self.push(Frame::Array(None))?;
                        self.state = State::InArray;
                    }
                    b if starts_value(b) => {
                        self.state = State::InValue;
                        continue;
                    }
                    _ => return Err(syntax(i)),
                },

                State::InArray => match byte {
                    b if is_whitespace(b) => {}
                    b'/' => i = self.enter_comment(i)?,
                    b'{' => {
                        self.next_index();
                        self.push(Frame::Object(None))?;
                        self.state = State::InObject;
                    }
                    b'[' => {
                        self.next_index();
                        self.push(Frame::Array(None))?;
                        self.state = State::InArray;
                    }
                    b']' => self.close(i, byte)?,
                    b if starts_value(b) => {
                        self.next_index();
                        self.state = State::InValue;
                        continue;
                    }
                    _ => return Err(syntax(i)),
                },

                State::InValue => {
                    let (value, last) = scan_value(input, i)?;
                    i = last;
                    self.state = State::FindComma;
                    if (self.on_leaf)(&Path::new(&self.stack), value) == Flow::Stop {
                        return Ok(());
                    }
                }

                State::FindComma => match byte {
                    b if is_whitespace(b) => {}
                    b'/' => i = self.enter_comment(i)?,
                    b',' => {
                        self.state = match self.stack.last() {
                            Some(Frame::Array(_)) => State::InArray,
                            _ => State::InObject,
                        };
                    }
                    b']' | b'}' => self.close(i, byte)?,
                    _ => return Err(syntax(i)),
                },

                State::Finished => match byte {
                    b if is_whitespace(b) => {}
                    b'/' => i = self.enter_comment(i)?,
                    _ => return Err(syntax(i)),
                },
            }
            i += 1;
        }

        match (self.state, self.resume) {
            (State::Finished, _) | (State::InComment, State::Finished) => Ok(()),
            _ => Err(syntax(input.len())),
        }
    }

    /// `input[at]` is `/`; the next byte must be `/` too. Returns the index of
    /// the second slash.
    fn enter_comment(&mut self, at: usize) -> Result<usize, ParseError> {
        if self.input.get(at + 1) != Some(&b'/') {
            return Err(syntax(at + 1));
        }
        self.resume = self.state;
        self.state = State::InComment;
        Ok(at + 1)
    }

    fn push(&mut self, frame: Frame<'a>) -> Result<(), ParseError> {
        if self.stack.len() >= self.max_depth {
            return Err(ParseError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        self.stack.push(frame);
        Ok(())
    }

    fn close(&mut self, at: usize, closer: u8) -> Result<(), ParseError> {
        let matched = matches!(
            (self.stack.last(), closer),
            (Some(Frame::Object(_)), b'}') | (Some(Frame::Array(_)), b']')
        );
        if !matched {
            return Err(syntax(at));
        }
        self.stack.pop();
        self.state = if self.stack.is_empty() {
            State::Finished
        } else {
            State::FindComma
        };
        Ok(())
    }

    fn next_index(&mut self) {
        if let Some(Frame::Array(index)) = self.stack.last_mut() {
            *index = Some(index.map_or(0, |n| n + 1));
        }
    }
}

/// Validate the escape starting at `input[at] == b'\\'`; returns the index of
/// its last byte.
fn scan_escape(input: &[u8], at: usize) -> Result<usize, ParseError> {
    let kind_at = at + 1;
    match input.get(kind_at) {
        Some(b'u') => {
            for offset in 1..=4 {
                let pos = kind_at + offset;
                match input.get(pos) {
                    Some(b) if b.is_ascii_hexdigit() => {}
                    _ => return Err(syntax(pos.min(input.len()))),
                }
            }
            Ok(kind_at + 4)
        }
        Some(b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't') => Ok(kind_at),
        _ => Err(syntax(kind_at.min(input.len()))),
    }
}

/// Scan one terminal value starting at `start`; returns it with the index of
/// its last byte.
fn scan_value(input: &[u8], start: usize) -> Result<(Value<'_>, usize), ParseError> {
    match input[start] {
        b'"' => scan_string(input, start),
        b't' => scan_literal(input, start, b"true", Value::Bool(true)),
        b'f' => scan_literal(input, start, b"false", Value::Bool(false)),
        b'n' => scan_literal(input, start, b"null", Value::Null),
        _ => scan_number(input, start),
    }
}

fn scan_string(input: &[u8], start: usize) -> Result<(Value<'_>, usize), ParseError> {
    let mut j = start + 1;
    while j < input.len() {
        match input[j] {
            b'"' => return Ok((Value::String(RawStr::new(&input[start + 1..j])), j)),
            b'\\' => j = scan_escape(input, j)?,
            b'\n' | b'\r' => return Err(syntax(j)),
            _ => {}
        }
        j += 1;
    }
    Err(syntax(input.len()))
}

fn scan_literal<'a>(
    input: &'a [u8],
    start: usize,
    word: &[u8],
    value: Value<'a>,
) -> Result<(Value<'a>, usize), ParseError> {
    for (k, expected) in word.iter().enumerate() {
        if input.get(start + k) != Some(expected) {
            return Err(syntax((start + k).min(input.len())));
        }
    }
    Ok((value, start + word.len() - 1))
}

fn count_digits(input: &[u8], from: usize) -> usize {
    input
        .get(from..)
        .map_or(0, |rest| rest.iter().take_while(|b| b.is_ascii_digit()).count())
}

/// Integer unless a decimal point or exponent is present.
fn scan_number(input: &[u8], start: usize) -> Result<(Value<'_>, usize), ParseError> {
    let mut j = start;
    let mut is_double = false;

    if input.get(j) == Some(&b'-') {
        j += 1;
    }
    let digits = count_digits(input, j);
    if digits == 0 {
        return Err(syntax(j.min(input.len())));
    }
    j += digits;

    if input.get(j) == Some(&b'.') {
        is_double = true;
        j += 1;
        let digits = count_digits(input, j);
        if digits == 0 {
            return Err(syntax(j.min(input.len())));
        }
        j += digits;
    }

    if matches!(input.get(j), Some(b'e' | b'E')) {
        is_double = true;
        j += 1;
        if matches!(input.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let digits = count_digits(input, j);
        if digits == 0 {
            return Err(syntax(j.min(input.len())));
        }
        j += digits;
    }

    let text = std::str::from_utf8(&input[start..j]).map_err(|_| syntax(start))?;
    let value = if is_double {
        Value::Double(text.parse().map_err(|_| syntax(start))?)
    } else {
        Value::Integer(text.parse().map_err(|_| syntax(start))?)
    };
    Ok((value, j - 1))
}
