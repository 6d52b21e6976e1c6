//! Yes/no questions on the terminal

use std::io::{self, BufRead, Write};

/// Ask `question` until the answer is yes or no. An empty answer means yes.
///
/// End of input counts as a refusal to answer and is an error.
pub fn confirm(question: &str, input: &mut dyn BufRead, out: &mut dyn Write) -> io::Result<bool> {
    loop {
        write!(out, "  {} [Y/n] ", question)?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "confirmation cancelled"));
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "" | "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(out, "  Please answer y or n.")?,
        }
    }
}

/// Deploys ask first only when a person is at the keyboard and the target
/// cluster is not the only one there is
pub fn needs_confirmation(force: bool, stdin_is_terminal: bool, cluster_count: usize) -> bool {
    !force && stdin_is_terminal && cluster_count > 1
}
