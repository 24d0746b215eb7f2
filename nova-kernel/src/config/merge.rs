use std::collections::BTreeSet;

use super::*;

impl ListLayer {
    fn apply_to(&self, target: &mut BTreeSet<String>) {
        match self {
            ListLayer::Replace(values) => *target = values.clone(),
            ListLayer::Extend(values) => target.extend(values.iter().cloned()),
        }
    }
}

impl SafetyPolicyConfig {
    fn apply_layer(&mut self, layer: &SafetyLayer) {
        if let Some(limit) = layer.max_lines_changed_total {
            self.max_lines_changed_total = limit;
        }
        if let Some(limit) = layer.max_files_modified {
            self.max_files_modified = limit;
        }
        if let Some(globs) = layer.denied_path_globs.as_ref() {
            globs.apply_to(&mut self.denied_path_globs);
        }
        if let Some(regexes) = layer.denied_path_regexes.as_ref() {
            regexes.apply_to(&mut self.denied_path_regexes);
        }
        if let Some(overrides) = layer.allowed_overrides.as_ref() {
            overrides.apply_to(&mut self.allowed_overrides);
        }
        if let Some(block) = layer.block_duplicate_definitions {
            self.block_duplicate_definitions = block;
        }
    }
}

impl SessionConfig {
    fn apply_layer(&mut self, layer: &SessionLayer) {
        if let Some(prefix) = layer.branch_prefix.as_ref() {
            self.branch_prefix = prefix.clone();
        }
        if let Some(allow_dirty) = layer.allow_dirty {
            self.allow_dirty = allow_dirty;
        }
    }
}

impl AuditConfig {
    fn apply_layer(&mut self, layer: &AuditLayer) {
        if let Some(enabled) = layer.enabled {
            self.enabled = enabled;
        }
        if let Some(path) = layer.path.as_ref() {
            self.path = path.clone();
        }
    }
}

impl Config {
    pub fn from_layers(layers: &[ConfigLayer]) -> Self {
        let mut config = Self::default();
        for layer in layers {
            config.apply_layer(layer);
        }
        config
    }

    pub fn apply_layer(&mut self, layer: &ConfigLayer) {
        self.safety.apply_layer(&layer.safety);
        self.session.apply_layer(&layer.session);
        self.audit.apply_layer(&layer.audit);
    }
}
