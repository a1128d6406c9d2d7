//! Minimal gcode word scanner
//!
//! Only the words that influence override tracking are of interest: the unit
//! mode (G20/G21), feed rate (F), spindle speed (S) and whether the line also
//! moves Z. Everything else on the line is ignored.

/// Unit mode selected by G20/G21
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitMode {
    /// G20
    Inches,
    /// G21
    Millimeters,
}

impl UnitMode {
    /// Feed rate unit for this mode
    pub fn feed_unit(self) -> &'static str {
        match self {
            UnitMode::Inches => "in/min",
            UnitMode::Millimeters => "mm/min",
        }
    }
}

/// Rate-relevant words found on one line
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateWords {
    /// Unit mode change, if any
    pub unit: Option<UnitMode>,
    /// F word value
    pub feed: Option<f64>,
    /// S word value
    pub spindle: Option<f64>,
    /// Whether a Z word is present
    pub has_z: bool,
}

/// Scan a line for rate-relevant words. Comments in parentheses and after
/// `;` are skipped; words may be separated by spaces or packed (`G1X5F300`).
pub fn scan(line: &str) -> RateWords {
    let mut words = RateWords::default();

    for (letter, value) in Words::new(line) {
        match letter {
            'G' => match value.parse::<f64>() {
                Ok(code) if code == 20.0 => words.unit = Some(UnitMode::Inches),
                Ok(code) if code == 21.0 => words.unit = Some(UnitMode::Millimeters),
                _ => {}
            },
            'F' => words.feed = value.parse().ok(),
            'S' => words.spindle = value.parse().ok(),
            'Z' => words.has_z = true,
            _ => {}
        }
    }

    words
}

/// Iterator over `(letter, number)` words of a line
struct Words<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: &'a str,
}

impl<'a> Words<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            chars: line.char_indices().peekable(),
            line,
        }
    }
}

impl<'a> Iterator for Words<'a> {
    type Item = (char, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (_, c) = self.chars.next()?;
            match c {
                ';' => return None,
                '(' => {
                    for (_, c) in self.chars.by_ref() {
                        if c == ')' {
                            break;
                        }
                    }
                }
                c if c.is_ascii_alphabetic() => {
                    while self.chars.next_if(|(_, c)| *c == ' ').is_some() {}

                    let start = match self.chars.peek() {
                        Some((idx, _)) => *idx,
                        None => self.line.len(),
                    };
                    let mut end = start;
                    while let Some((idx, digit)) = self
                        .chars
                        .next_if(|(_, c)| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
                    {
                        end = idx + digit.len_utf8();
                    }

                    if end > start {
                        return Some((c.to_ascii_uppercase(), &self.line[start..end]));
                    }
                }
                _ => {}
            }
        }
    }
}
