use std::iter::Peekable;
use std::str::Chars;

const TAB_WIDTH: usize = 4;

/// Strip terminal escape sequences and control characters from untrusted text.
///
/// Newlines are kept, tabs expand to spaces (ratatui measures `\t` as zero
/// width), carriage returns and every other C0/C1 control are dropped. CSI
/// and OSC sequences are removed whole so a payload cannot move the cursor,
/// recolour the screen or set the window title.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' => out.push('\n'),
            '\t' => out.extend(std::iter::repeat_n(' ', TAB_WIDTH)),
            '\u{1b}' => skip_escape(&mut chars),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

fn skip_escape(chars: &mut Peekable<Chars<'_>>) {
    match chars.peek() {
        // CSI: parameters and intermediates until a final byte in 0x40..=0x7E
        Some('[') => {
            chars.next();
            for c in chars.by_ref() {
                if ('\u{40}'..='\u{7e}').contains(&c) {
                    break;
                }
            }
        }
        // OSC: terminated by BEL or ST (ESC \)
        Some(']') => {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '\u{7}' {
                    break;
                }
                if c == '\u{1b}' {
                    if chars.peek() == Some(&'\\') {
                        chars.next();
                    }
                    break;
                }
            }
        }
        Some(_) => {
            chars.next();
        }
        None => {}
    }
}
