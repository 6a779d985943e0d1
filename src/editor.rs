use crate::template::{ParameterSet, TemplateError};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FieldKind {
    Text,
    Choice(Vec<String>),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: String,
    pub kind: FieldKind,
}

/// Field-by-field editor over one parameter set.
///
/// Fields are listed in name order. The accelerator-model parameter is a
/// choice field cycling through the configured models; every other field is
/// free text edited through a line buffer.
#[derive(Debug, Clone)]
pub struct ParameterForm {
    params: ParameterSet,
    source: Option<String>,
    selected: usize,
    editing: Option<String>,
    modified: bool,
    gpu_parameter: String,
    gpu_models: Vec<String>,
}

impl ParameterForm {
    pub fn new(
        params: ParameterSet,
        source: Option<String>,
        gpu_parameter: impl Into<String>,
        gpu_models: Vec<String>,
    ) -> Self {
        Self {
            params,
            source,
            selected: 0,
            editing: None,
            modified: false,
            gpu_parameter: gpu_parameter.into(),
            gpu_models,
        }
    }

    /// Name of the stored configuration this form was loaded from, if any.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn set_source(&mut self, source: Option<String>) {
        self.source = source;
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn modified(&self) -> bool {
        self.modified
    }

    pub fn mark_saved(&mut self) {
        self.modified = false;
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn editing(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    pub fn fields(&self) -> Vec<FormField> {
        self.params
            .iter()
            .map(|(name, value)| FormField {
                name: name.to_string(),
                value: value.to_string(),
                kind: self.kind_for(name),
            })
            .collect()
    }

    pub fn select_next(&mut self) {
        if self.editing.is_some() || self.params.is_empty() {
            return;
        }
        self.selected = (self.selected + 1).min(self.params.len() - 1);
    }

    pub fn select_previous(&mut self) {
        if self.editing.is_some() {
            return;
        }
        self.selected = self.selected.saturating_sub(1);
    }

    /// Opens the line buffer on a text field. Choice fields are cycled instead.
    pub fn begin_edit(&mut self) -> bool {
        let Some((name, value)) = self.selected_entry() else {
            return false;
        };
        if self.kind_for(&name) != FieldKind::Text {
            return false;
        }
        self.editing = Some(value);
        true
    }

    pub fn push_char(&mut self, ch: char) {
        if let Some(buffer) = self.editing.as_mut() {
            buffer.push(ch);
        }
    }

    pub fn pop_char(&mut self) {
        if let Some(buffer) = self.editing.as_mut() {
            buffer.pop();
        }
    }

    pub fn commit_edit(&mut self) -> Result<(), TemplateError> {
        let Some(buffer) = self.editing.take() else {
            return Ok(());
        };
        let Some((name, value)) = self.selected_entry() else {
            return Ok(());
        };
        if buffer != value {
            self.params.set(&name, buffer)?;
            self.modified = true;
        }
        Ok(())
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    /// Moves a choice field one model forward or back. A value that is not one
    /// of the known models starts from the first entry.
    pub fn cycle_choice(&mut self, forward: bool) -> Result<(), TemplateError> {
        let Some((name, value)) = self.selected_entry() else {
            return Ok(());
        };
        let FieldKind::Choice(options) = self.kind_for(&name) else {
            return Ok(());
        };

        let next = match options.iter().position(|option| *option == value) {
            Some(index) if forward => (index + 1) % options.len(),
            Some(index) => (index + options.len() - 1) % options.len(),
            None => 0,
        };
        self.params.set(&name, options[next].clone())?;
        self.modified = true;
        Ok(())
    }

    /// Applies a bulk-edited document. Leaves the form untouched on error.
    pub fn replace_from_bulk(&mut self, text: &str) -> Result<(), TemplateError> {
        let before = self.params.clone();
        self.params.apply_bulk_text(text)?;
        if self.params != before {
            self.modified = true;
        }
        Ok(())
    }

    fn selected_entry(&self) -> Option<(String, String)> {
        self.params
            .iter()
            .nth(self.selected)
            .map(|(name, value)| (name.to_string(), value.to_string()))
    }

    fn kind_for(&self, name: &str) -> FieldKind {
        if name == self.gpu_parameter && !self.gpu_models.is_empty() {
            FieldKind::Choice(self.gpu_models.clone())
        } else {
            FieldKind::Text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldKind, ParameterForm};
    use crate::template::ParameterSet;

    fn models() -> Vec<String> {
        vec![
            "NVIDIA-H200".to_string(),
            "NVIDIA-H100-80GB-HBM3".to_string(),
            "NVIDIA-A100-SXM4-80GB".to_string(),
        ]
    }

    fn form() -> ParameterForm {
        ParameterForm::new(
            ParameterSet::from_pairs([
                ("IMAGE", "nginx"),
                ("GPU_PRODUCT", "NVIDIA-A100-SXM4-80GB"),
                ("EPOCHS", "10"),
            ]),
            None,
            "GPU_PRODUCT",
            models(),
        )
    }

    #[test]
    fn fields_are_sorted_and_gpu_is_a_choice() {
        let fields = form().fields();
        let names = fields
            .iter()
            .map(|field| field.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["EPOCHS", "GPU_PRODUCT", "IMAGE"]);
        assert_eq!(fields[1].kind, FieldKind::Choice(models()));
        assert_eq!(fields[2].kind, FieldKind::Text);
    }

    #[test]
    fn text_edit_commits_buffer() {
        let mut form = form();
        form.select_next();
        form.select_next();
        assert!(form.begin_edit());
        for _ in 0.."nginx".len() {
            form.pop_char();
        }
        for ch in "busybox".chars() {
            form.push_char(ch);
        }
        assert_eq!(form.editing(), Some("busybox"));
        form.commit_edit().expect("committed");
        assert_eq!(form.params().get("IMAGE"), Some("busybox"));
        assert!(form.modified());
        assert_eq!(form.editing(), None);
    }

    #[test]
    fn cancelled_edit_changes_nothing() {
        let mut form = form();
        assert!(form.begin_edit());
        form.push_char('0');
        form.cancel_edit();
        assert_eq!(form.params().get("EPOCHS"), Some("10"));
        assert!(!form.modified());
    }

    #[test]
    fn unchanged_commit_is_not_a_modification() {
        let mut form = form();
        assert!(form.begin_edit());
        form.commit_edit().expect("committed");
        assert!(!form.modified());
    }

    #[test]
    fn choice_field_cycles_known_models_only() {
        let mut form = form();
        form.select_next();
        assert!(!form.begin_edit());

        form.cycle_choice(true).expect("cycled");
        assert_eq!(form.params().get("GPU_PRODUCT"), Some("NVIDIA-H200"));
        form.cycle_choice(false).expect("cycled");
        assert_eq!(form.params().get("GPU_PRODUCT"), Some("NVIDIA-A100-SXM4-80GB"));
        form.cycle_choice(false).expect("cycled");
        assert_eq!(form.params().get("GPU_PRODUCT"), Some("NVIDIA-H100-80GB-HBM3"));
        assert!(form.modified());
    }

    #[test]
    fn unknown_model_cycles_to_first_entry() {
        let mut form = ParameterForm::new(
            ParameterSet::from_pairs([("GPU_PRODUCT", "Tesla-V100")]),
            None,
            "GPU_PRODUCT",
            models(),
        );
        form.cycle_choice(true).expect("cycled");
        assert_eq!(form.params().get("GPU_PRODUCT"), Some("NVIDIA-H200"));
    }

    #[test]
    fn selection_is_clamped() {
        let mut form = form();
        for _ in 0..10 {
            form.select_next();
        }
        assert_eq!(form.selected(), 2);
        for _ in 0..10 {
            form.select_previous();
        }
        assert_eq!(form.selected(), 0);
    }

    #[test]
    fn failed_bulk_edit_keeps_previous_values() {
        let mut form = form();
        assert!(form.replace_from_bulk("UNKNOWN: 1\n").is_err());
        assert_eq!(form.params().get("IMAGE"), Some("nginx"));
        assert!(!form.modified());

        form.replace_from_bulk("IMAGE: busybox\n").expect("accepted");
        assert_eq!(form.params().get("IMAGE"), Some("busybox"));
        assert!(form.modified());
    }
}
