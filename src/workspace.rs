//! Ties the normalizer, the display text inserter and the command registry to
//! an open document, the way an editor host would.

use std::path::Path;

use tracing::info;

use crate::{
    commands::{Command, CommandInterceptor, CommandRegistry},
    config::Settings,
    display_text::{self, TRIGGER_KEY},
    editor::EditorBuffer,
    normalizer::{NormalizeSummary, Normalizer, OpenBuffer},
    vault::{Document, DocumentStore},
};

/// The host's own save command.
pub const SAVE_COMMAND: &str = "editor:save-file";
pub const NORMALIZE_CURRENT_COMMAND: &str = "normalize-wikilinks-current-file";

/// The document open in the editor.
pub struct ActiveDocument {
    pub document: Document,
    pub buffer: EditorBuffer,
    save_requested: bool,
}

/// State the commands operate on.
///
/// `settings` is read on every command and keystroke, so changing it applies immediately.
pub struct Session<S> {
    pub settings: Settings,
    pub store: S,
    pub normalizer: Normalizer,
    active: Option<ActiveDocument>,
    notices: Vec<String>,
}

impl<S: DocumentStore> Session<S> {
    pub fn active(&self) -> Option<&ActiveDocument> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ActiveDocument> {
        self.active.as_mut()
    }

    /// User-facing messages, oldest first.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    fn notice(&mut self, message: String) {
        info!("{message}");
        self.notices.push(message);
    }

    /// Normalizes the open document's buffer. Its links come from the buffer
    /// itself, which is always current.
    pub fn normalize_current(&mut self) -> usize {
        let Some(active) = self.active.as_mut() else {
            return 0;
        };

        let index = self.normalizer.index(&self.store);
        let count = self
            .normalizer
            .normalize_live(&mut active.buffer, &index, &self.settings);

        if count > 0 {
            self.notice(format!("Normalized {count} wikilink(s)"));
        }
        count
    }

    pub fn on_document_created(&self) {
        self.normalizer.invalidate_index();
    }

    pub fn on_document_deleted(&self) {
        self.normalizer.invalidate_index();
    }

    pub fn on_document_renamed(&self) {
        self.normalizer.invalidate_index();
    }
}

pub struct Workspace<S: DocumentStore + 'static> {
    session: Session<S>,
    commands: CommandRegistry<Session<S>>,
    save_interceptor: CommandInterceptor<Session<S>>,
}

impl<S: DocumentStore + 'static> Workspace<S> {
    pub fn new(settings: Settings, store: S) -> Workspace<S> {
        let mut commands = CommandRegistry::new();

        commands.register(Command::new(
            SAVE_COMMAND,
            "Save current file",
            |session: &mut Session<S>, checking| {
                let Some(active) = session.active.as_mut() else {
                    return false;
                };
                if !checking {
                    active.save_requested = true;
                }
                true
            },
        ));

        commands.register(Command::new(
            NORMALIZE_CURRENT_COMMAND,
            "Normalize wikilinks in current file",
            |session: &mut Session<S>, checking| {
                if session.active.is_none() {
                    return false;
                }
                if !checking {
                    session.normalize_current();
                }
                true
            },
        ));

        let save_interceptor =
            CommandInterceptor::install(&mut commands, SAVE_COMMAND, |session: &mut Session<S>| {
                if session.settings.normalize_on_save {
                    session.normalize_current();
                }
            });

        Workspace {
            session: Session {
                normalizer: Normalizer::new(),
                settings,
                store,
                active: None,
                notices: Vec::new(),
            },
            commands,
            save_interceptor,
        }
    }

    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<S> {
        &mut self.session
    }

    pub fn commands(&self) -> &CommandRegistry<Session<S>> {
        &self.commands
    }

    /// Loads `document` into the editor buffer, caret at the start.
    pub async fn open(&mut self, document: Document) -> anyhow::Result<()> {
        let text = self.session.store.read(&document).await?;
        self.session.active = Some(ActiveDocument {
            document,
            buffer: EditorBuffer::new(&text),
            save_requested: false,
        });
        Ok(())
    }

    pub fn close(&mut self) {
        self.session.active = None;
    }

    /// Runs a registered command if it is available. Returns whether it ran.
    pub fn run_command(&mut self, id: &str) -> bool {
        self.commands.execute(id, &mut self.session)
    }

    /// Key press in the editor. Returns true when the default handling of the key is cancelled.
    pub fn key_down(&mut self, key: char) -> bool {
        if key != TRIGGER_KEY || !self.session.settings.enable_auto_display_text {
            return false;
        }
        let Some(active) = self.session.active.as_mut() else {
            return false;
        };
        display_text::handle_pipe_key(&mut active.buffer, &self.session.settings)
    }

    /// Runs the save command and writes the buffer if it requested so.
    pub async fn save(&mut self) -> anyhow::Result<bool> {
        if !self.run_command(SAVE_COMMAND) {
            return Ok(false);
        }

        let Some(active) = self.session.active.as_mut() else {
            return Ok(false);
        };
        if !active.save_requested {
            return Ok(false);
        }
        self.session
            .store
            .write(&active.document, &active.buffer.text())
            .await?;
        active.save_requested = false;
        Ok(true)
    }

    /// Normalizes every document of the store. `None` if a pass is already running.
    ///
    /// The open document is normalized in its buffer, which keeps unsaved
    /// edits; it reaches the store on the next save.
    pub async fn normalize_vault(&mut self) -> Option<NormalizeSummary> {
        let open = self.session.active.as_mut().map(|active| OpenBuffer {
            document: &active.document,
            buffer: &mut active.buffer,
        });
        let summary = self
            .session
            .normalizer
            .normalize_all_with_open(&self.session.store, &self.session.settings, open)
            .await?;

        self.session.notice(format!(
            "Normalized {} wikilink(s) in {} file(s)",
            summary.links_changed, summary.documents_changed
        ));
        Some(summary)
    }

    pub async fn create_document(&mut self, path: &Path, text: &str) -> anyhow::Result<Document> {
        let document = self.session.store.create(path, text).await?;
        self.session.on_document_created();
        Ok(document)
    }

    pub async fn delete_document(&mut self, document: &Document) -> anyhow::Result<()> {
        self.session.store.delete(document).await?;
        self.session.on_document_deleted();
        if self
            .session
            .active
            .as_ref()
            .is_some_and(|active| active.document == *document)
        {
            self.close();
        }
        Ok(())
    }

    pub async fn rename_document(
        &mut self,
        document: &Document,
        new_path: &Path,
    ) -> anyhow::Result<Document> {
        let renamed = self.session.store.rename(document, new_path).await?;
        self.session.on_document_renamed();
        if let Some(active) = self.session.active.as_mut() {
            if active.document == *document {
                active.document = renamed.clone();
            }
        }
        Ok(renamed)
    }

    /// Puts the host's save command back as it was.
    pub fn unload(&mut self) {
        self.save_interceptor.uninstall(&mut self.commands);
    }
}
