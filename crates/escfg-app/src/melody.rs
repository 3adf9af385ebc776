//! Melody editor visibility

use serde::Serialize;

use escfg_core::MelodyModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorVisibility {
    #[default]
    Hidden,
    Visible,
}

/// Gates the melody editor view and keeps its model across show/hide.
#[derive(Debug, Clone, Default)]
pub struct MelodyEditorSession {
    visibility: EditorVisibility,
    model: Option<MelodyModel>,
}

impl MelodyEditorSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visibility(&self) -> EditorVisibility {
        self.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == EditorVisibility::Visible
    }

    pub fn model(&self) -> Option<&MelodyModel> {
        self.model.as_ref()
    }

    /// Show the editor, creating the default model on first use.
    pub fn request_show(&mut self) -> &MelodyModel {
        self.visibility = EditorVisibility::Visible;
        self.model.get_or_insert_with(MelodyModel::default)
    }

    /// Hide the editor. The model is kept for the next `request_show`.
    pub fn request_hide(&mut self) {
        self.visibility = EditorVisibility::Hidden;
    }

    /// Replace the edited model, e.g. before committing it to the ESCs.
    pub fn set_model(&mut self, model: MelodyModel) {
        self.model = Some(model);
    }
}
