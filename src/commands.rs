//! Command registry and interception of existing commands.

use std::{collections::HashMap, rc::Rc};

use tracing::debug;

/// Called with `checking = true` to ask whether the command is available,
/// and with `checking = false` to run it.
pub type CheckCallback<C> = Rc<dyn Fn(&mut C, bool) -> bool>;

pub struct Command<C> {
    pub id: String,
    pub name: String,
    pub check_callback: Option<CheckCallback<C>>,
}

impl<C> Command<C> {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        check_callback: impl Fn(&mut C, bool) -> bool + 'static,
    ) -> Command<C> {
        Command {
            id: id.into(),
            name: name.into(),
            check_callback: Some(Rc::new(check_callback)),
        }
    }
}

/// Commands by id. `C` is the state commands operate on.
pub struct CommandRegistry<C> {
    commands: HashMap<String, Command<C>>,
}

impl<C> Default for CommandRegistry<C> {
    fn default() -> Self {
        CommandRegistry {
            commands: HashMap::new(),
        }
    }
}

impl<C> CommandRegistry<C> {
    pub fn new() -> CommandRegistry<C> {
        CommandRegistry::default()
    }

    pub fn register(&mut self, command: Command<C>) {
        self.commands.insert(command.id.clone(), command);
    }

    pub fn get(&self, id: &str) -> Option<&Command<C>> {
        self.commands.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Command<C>> {
        self.commands.get_mut(id)
    }

    /// Checks whether `id` is available and, if so, runs it. Returns whether it ran.
    pub fn execute(&self, id: &str, context: &mut C) -> bool {
        let Some(callback) = self.get(id).and_then(|cmd| cmd.check_callback.clone()) else {
            return false;
        };
        if !callback(context, true) {
            return false;
        }
        debug!(command = id, "executing command");
        callback(context, false);
        true
    }
}

/// Wraps an existing command so that `on_command` runs after it.
///
/// The original callback is kept and put back by `uninstall`, at most once.
pub struct CommandInterceptor<C> {
    command: String,
    original: Option<CheckCallback<C>>,
}

impl<C: 'static> CommandInterceptor<C> {
    /// Nothing is installed if the command is missing or has no callback.
    pub fn install(
        registry: &mut CommandRegistry<C>,
        command: &str,
        on_command: impl Fn(&mut C) + 'static,
    ) -> CommandInterceptor<C> {
        let original = registry
            .get_mut(command)
            .and_then(|cmd| cmd.check_callback.clone());

        if let (Some(cmd), Some(original)) = (registry.get_mut(command), original.clone()) {
            let wrapped: CheckCallback<C> = Rc::new(move |context: &mut C, checking: bool| {
                let result = original(context, checking);
                if !checking {
                    on_command(context);
                }
                result
            });
            cmd.check_callback = Some(wrapped);
        }

        CommandInterceptor {
            command: command.to_string(),
            original,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.original.is_some()
    }

    pub fn uninstall(&mut self, registry: &mut CommandRegistry<C>) {
        let Some(original) = self.original.take() else {
            return;
        };
        if let Some(cmd) = registry.get_mut(&self.command) {
            cmd.check_callback = Some(original);
        }
    }
}
