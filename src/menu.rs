//! Interactive menu, the tool's default mode.

use crate::engine::ConsoleProgress;
use crate::error::Result as EngineResult;
use crate::objects::ObjectCatalog;
use crate::operations::{default_orphan_filter, ExtractOptions, Operations};
use crate::report;
use crate::shutdown::{say_goodbye, InterruptGuard};
use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Confirm, FuzzySelect, Input, Select};
use std::io;
use tracing::debug;

/// Whether the caller should keep going after an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Prints the outcome of one operation. Failures are reported and the tool
/// carries on; an interrupt ends the session with a goodbye.
pub fn settle<T>(guard: &InterruptGuard, result: EngineResult<T>, on_ok: impl FnOnce(&T)) -> Flow {
    match result {
        Ok(value) => on_ok(&value),
        Err(err) if err.is_cancelled() => {}
        Err(err) => report::failure(&err),
    }
    if guard.is_interrupted() {
        say_goodbye();
        Flow::Stop
    } else {
        Flow::Continue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    ListObjects,
    FieldsOne,
    FieldsAll,
    SampleOne,
    SampleAll,
    Orphans,
    Delete,
    Exit,
}

const ACTIONS: &[(Action, &str)] = &[
    (Action::ListObjects, "List object types"),
    (Action::FieldsOne, "Extract all field names from an object"),
    (Action::FieldsAll, "Extract all field names from all objects"),
    (Action::SampleOne, "Extract a data sample from an object"),
    (Action::SampleAll, "Extract a data sample from all objects"),
    (Action::Orphans, "Extract records without a parent association"),
    (Action::Delete, "Archive records listed in the input folder"),
    (Action::Exit, "Exit"),
];

pub struct Menu<'a> {
    ops: &'a Operations,
    guard: &'a InterruptGuard,
    theme: ColorfulTheme,
}

impl<'a> Menu<'a> {
    #[must_use]
    pub fn new(ops: &'a Operations, guard: &'a InterruptGuard) -> Self {
        Self {
            ops,
            guard,
            theme: ColorfulTheme::default(),
        }
    }

    /// Shows the menu until the user exits or interrupts
    ///
    /// # Errors
    ///
    /// Returns an error only if the terminal cannot be driven.
    pub async fn run(&self) -> Result<()> {
        println!("Press Ctrl+C at any time to stop.");
        println!(
            "Exports are written to {}",
            self.ops.config().paths.output_dir.display()
        );

        loop {
            let labels: Vec<&str> = ACTIONS.iter().map(|(_, label)| *label).collect();
            let choice = self.prompt(
                Select::with_theme(&self.theme)
                    .with_prompt("What do you want to do today?")
                    .items(&labels)
                    .default(0)
                    .interact_opt(),
            )?;
            let Some(index) = choice.flatten() else {
                if self.guard.is_interrupted() {
                    say_goodbye();
                }
                return Ok(());
            };

            let action = ACTIONS[index].0;
            debug!(?action, "Menu selection");
            if action == Action::Exit {
                return Ok(());
            }
            if self.perform(action).await? == Flow::Stop {
                return Ok(());
            }
        }
    }

    /// Unwraps a prompt. Ctrl+C at the prompt yields `None` and marks the
    /// session interrupted.
    fn prompt<T>(&self, result: dialoguer::Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(dialoguer::Error::IO(err)) if err.kind() == io::ErrorKind::Interrupted => {
                self.guard.token().cancel();
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn perform(&self, action: Action) -> Result<Flow> {
        let guard = self.guard;
        let ops = self.ops;
        let flow = match action {
            Action::ListObjects => {
                let _busy = guard.busy();
                settle(guard, ops.catalog().await, report::objects)
            }
            Action::FieldsOne => {
                let Some(object) = self.pick_object().await? else {
                    return Ok(self.stop_or_continue());
                };
                let _busy = guard.busy();
                settle(guard, ops.export_fields(&object).await, |p| report::written(p))
            }
            Action::FieldsAll => {
                let _busy = guard.busy();
                settle(guard, ops.export_all_fields().await, report::bulk)
            }
            Action::SampleOne => {
                let Some(object) = self.pick_object().await? else {
                    return Ok(self.stop_or_continue());
                };
                let _busy = guard.busy();
                settle(guard, ops.export_sample(&object).await, |p| report::written(p))
            }
            Action::SampleAll => {
                let _busy = guard.busy();
                settle(guard, ops.export_all_samples().await, report::bulk)
            }
            Action::Orphans => self.orphans().await?,
            Action::Delete => self.delete().await?,
            Action::Exit => Flow::Stop,
        };
        Ok(flow)
    }

    /// After a prompt returned nothing: Ctrl+C ends the session, Esc goes back
    fn stop_or_continue(&self) -> Flow {
        if self.guard.is_interrupted() {
            say_goodbye();
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    /// Lets the user choose an object type; `None` when they back out
    async fn pick_object(&self) -> Result<Option<String>> {
        let catalog = {
            let _busy = self.guard.busy();
            match self.ops.catalog().await {
                Ok(catalog) => catalog,
                Err(err) => {
                    report::failure(&err);
                    return Ok(None);
                }
            }
        };
        self.select_from(&catalog)
    }

    fn select_from(&self, catalog: &ObjectCatalog) -> Result<Option<String>> {
        let names: Vec<&str> = catalog.all().collect();
        let picked = self.prompt(
            FuzzySelect::with_theme(&self.theme)
                .with_prompt("Object type")
                .items(&names)
                .default(0)
                .interact_opt(),
        )?;
        Ok(picked.flatten().map(|i| names[i].to_string()))
    }

    async fn orphans(&self) -> Result<Flow> {
        let Some(object) = self.pick_object().await? else {
            return Ok(self.stop_or_continue());
        };

        let missing = if default_orphan_filter(&object).is_some() {
            None
        } else {
            let Some(property) = self.prompt(
                Input::<String>::with_theme(&self.theme)
                    .with_prompt("Parent property that must be empty")
                    .interact_text(),
            )?
            else {
                return Ok(self.stop_or_continue());
            };
            Some(property)
        };

        let Some(properties) = self.prompt(
            Input::<String>::with_theme(&self.theme)
                .with_prompt("Properties to fetch (comma-separated, empty for all)")
                .allow_empty(true)
                .interact_text(),
        )?
        else {
            return Ok(self.stop_or_continue());
        };
        let properties: Vec<String> = properties
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        let options = ExtractOptions {
            properties: (!properties.is_empty()).then_some(properties),
            ..ExtractOptions::default()
        };
        let mut progress = ConsoleProgress::new();
        let _busy = self.guard.busy();
        let result = self
            .ops
            .export_orphans(&object, missing.as_deref(), options, &mut progress)
            .await;
        Ok(settle(self.guard, result, report::extract))
    }

    async fn delete(&self) -> Result<Flow> {
        let planned = {
            let _busy = self.guard.busy();
            self.ops.plan_input_dir().await
        };
        let (plans, rejected) = match planned {
            Ok(found) => found,
            Err(err) => return Ok(settle(self.guard, Err::<(), _>(err), |_| {})),
        };

        report::rejected(&rejected);
        if plans.is_empty() {
            println!(
                "No usable input files in {}",
                self.ops.config().paths.input_dir.display()
            );
            return Ok(Flow::Continue);
        }
        for plan in &plans {
            report::plan(plan);
        }

        let total: usize = plans.iter().map(|p| p.ids.len()).sum();
        let confirmed = self.prompt(
            Confirm::with_theme(&self.theme)
                .with_prompt(format!(
                    "Archive {total} record(s) from {} file(s)?",
                    plans.len()
                ))
                .default(false)
                .interact(),
        )?;
        match confirmed {
            None => return Ok(self.stop_or_continue()),
            Some(false) => {
                println!("Nothing archived.");
                return Ok(Flow::Continue);
            }
            Some(true) => {}
        }

        for plan in &plans {
            let mut progress = ConsoleProgress::new();
            let _busy = self.guard.busy();
            let result = self.ops.execute_delete(plan, &mut progress).await;
            if settle(self.guard, result, report::delete) == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }
}
