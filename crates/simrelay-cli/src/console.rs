//! Line-oriented terminal front end

use std::io::{BufRead, Write};

use simrelay_core::{AskChoice, Frontend, SeverityAsk, ValueKind, ValuePrompt};
use tracing::warn;

/// Front end that prompts on a writer and reads answers from a reader
pub struct ConsoleFrontend<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsoleFrontend<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Give back the writer, e.g. to inspect what was printed
    pub fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, text: &str) {
        let result = self
            .output
            .write_all(text.as_bytes())
            .and_then(|_| self.output.flush());
        if let Err(e) = result {
            warn!(error = %e, "Failed to write to console");
        }
    }

    /// One trimmed line, or `None` at end of input
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(e) => {
                warn!(error = %e, "Failed to read from console");
                None
            }
        }
    }
}

fn parse_choice(answer: &str, debug_enabled: bool) -> Option<AskChoice> {
    match answer {
        "c" => Some(AskChoice::Continue),
        "a" => Some(AskChoice::ContinueAlways),
        "q" => Some(AskChoice::Terminate),
        "d" => Some(AskChoice::DumpCore),
        "g" if debug_enabled => Some(AskChoice::Debug),
        _ => None,
    }
}

impl<R: BufRead, W: Write> Frontend for ConsoleFrontend<R, W> {
    fn request_value(&mut self, prompt: &ValuePrompt) -> Option<String> {
        let hint = match prompt.kind {
            ValueKind::Text => "value",
            ValueKind::OpenFile => "file to open",
            ValueKind::SaveFile => "file to save",
        };
        self.say(&format!(
            "{} [{}] ({hint}, empty to cancel): ",
            prompt.prompt, prompt.current
        ));
        self.read_line()
    }

    fn ask_severity(&mut self, ask: &SeverityAsk) -> AskChoice {
        let record = &ask.record;
        let mut menu = String::from("c=continue, a=continue and don't ask again, q=quit, d=dump core");
        if ask.debug_enabled {
            menu.push_str(", g=debugger");
        }
        self.say(&format!(
            "\n{} event from {}\n  {}\n{menu}\n",
            record.level.name().to_uppercase(),
            record.device,
            record.message
        ));

        loop {
            self.say("choice: ");
            let Some(answer) = self.read_line() else {
                warn!("Console closed during severity ask, continuing");
                return AskChoice::Continue;
            };
            match parse_choice(&answer, ask.debug_enabled) {
                Some(choice) => return choice,
                None => self.say(&format!("'{answer}' is not one of the choices\n")),
            }
        }
    }

    fn raise(&mut self) {
        self.say("\x07");
    }
}
