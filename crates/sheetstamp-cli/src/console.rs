//! Prompt-and-answer console flow

use std::io::{self, BufRead, Write};

use sheetstamp::{parse_quantity, Configuration, Field, UserInputs};

/// Line-based prompter over any reader/writer pair
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `question` and read one line, without its line ending
    pub fn ask(&mut self, question: &str) -> io::Result<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed while waiting for an answer",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    pub fn say(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.output, "{}", line)
    }

    /// `{category} - {n}. {template}` for every template
    pub fn list_templates(&mut self, config: &Configuration) -> io::Result<()> {
        self.say("Available templates:")?;
        for (category, templates) in config.files.iter() {
            for (i, name) in templates.keys().enumerate() {
                writeln!(self.output, "{} - {}. {}", category, i + 1, name)?;
            }
        }
        Ok(())
    }

    /// Ask for a category name and template number until both are valid
    pub fn select_template(&mut self, config: &Configuration) -> io::Result<(String, String)> {
        if config.templates().next().is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no templates configured",
            ));
        }

        loop {
            self.list_templates(config)?;
            let category = self.ask("\nEnter category name: ")?;
            let choice = self.ask("\nEnter template number: ")?;

            let Ok(number) = choice.trim().parse::<usize>() else {
                self.say("Please enter a number.")?;
                continue;
            };

            let selected = config
                .files
                .get(category.trim())
                .and_then(|templates| templates.get_index(number.checked_sub(1)?));

            match selected {
                Some((name, _)) => return Ok((category.trim().to_string(), name.clone())),
                None => self.say("Invalid selection. Please try again.")?,
            }
        }
    }

    /// Ask for a template number within `category` until it is valid
    pub fn select_in_category(&mut self, config: &Configuration, category: &str) -> io::Result<String> {
        let templates = match config.files.get(category.trim()) {
            Some(templates) if !templates.is_empty() => templates,
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("category '{}' has no templates", category),
                ))
            }
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unknown category '{}'", category),
                ))
            }
        };

        loop {
            writeln!(self.output, "Templates in {}:", category.trim())?;
            for (i, name) in templates.keys().enumerate() {
                writeln!(self.output, "{}. {}", i + 1, name)?;
            }

            let choice = self.ask("\nEnter template number: ")?;
            let selected = choice
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|number| templates.get_index(number.checked_sub(1)?));

            match selected {
                Some((name, _)) => return Ok(name.clone()),
                None => self.say("Invalid selection. Please try again.")?,
            }
        }
    }

    /// Fill in whatever part of a category/template choice is missing
    pub fn resolve_template(
        &mut self,
        config: &Configuration,
        category: Option<String>,
        template: Option<String>,
    ) -> io::Result<(String, String)> {
        match (category, template) {
            (Some(category), Some(template)) => Ok((category, template)),
            (Some(category), None) => {
                let template = self.select_in_category(config, &category)?;
                Ok((category.trim().to_string(), template))
            }
            (None, _) => self.select_template(config),
        }
    }

    /// Answer for every field not already in `preset`, in field order.
    ///
    /// Preset values for coordinates no field mentions are kept after the
    /// field answers.
    pub fn collect_values(&mut self, fields: &[Field], preset: &UserInputs) -> io::Result<UserInputs> {
        let mut values = UserInputs::new();

        for field in fields {
            let value = match preset.get(&field.coordinate) {
                Some(value) => value.clone(),
                None if field.serial => self.ask(&format!("{} (serial number): ", field.label))?,
                None => self.ask(&format!("{}: ", field.label))?,
            };
            values.insert(field.coordinate.clone(), value);
        }

        for (coordinate, value) in preset.iter() {
            if !values.contains_key(coordinate) {
                values.insert(coordinate.clone(), value.clone());
            }
        }

        Ok(values)
    }

    /// Ask for a quantity until a positive number is entered
    pub fn ask_quantity(&mut self) -> io::Result<u32> {
        loop {
            let answer = self.ask("Number of copies: ")?;
            match parse_quantity(&answer) {
                Ok(quantity) => return Ok(quantity),
                Err(e) => self.say(&e.to_string())?,
            }
        }
    }
}
