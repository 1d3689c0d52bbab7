use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ccmd_core::TemplateError;
use walkdir::WalkDir;

use crate::{map_cli_source_path, map_cli_source_read, map_cli_source_scan, map_cli_template_read};

const TEMPLATE_EXTENSION: &str = ".tmpl";

pub(crate) fn read_template(path: &Path) -> Result<String, TemplateError> {
    if !path.is_file() {
        return Err(TemplateError::new(
            "CLI_TEMPLATE_NOT_FOUND",
            format!("Template file does not exist: {}", path.display()),
        ));
    }
    fs::read_to_string(path).map_err(map_cli_template_read)
}

pub(crate) fn resolve_templates_dir(templates_dir: &str) -> Result<PathBuf, TemplateError> {
    let path = PathBuf::from(templates_dir);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(path)
    };

    if !absolute.exists() {
        return Err(TemplateError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("templates-dir does not exist: {}", absolute.display()),
        ));
    }

    if !absolute.is_dir() {
        return Err(TemplateError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("templates-dir is not a directory: {}", absolute.display()),
        ));
    }

    Ok(absolute)
}

/// Every `*.tmpl` file under `templates_dir`, keyed by its relative path.
pub(crate) fn read_templates_from_dir(
    templates_dir: &Path,
) -> Result<BTreeMap<String, String>, TemplateError> {
    let mut templates = BTreeMap::new();

    for entry in WalkDir::new(templates_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !path.to_string_lossy().ends_with(TEMPLATE_EXTENSION) {
            continue;
        }

        let relative = path
            .strip_prefix(templates_dir)
            .map_err(map_cli_source_scan)?
            .to_string_lossy()
            .replace('\\', "/");

        let content = fs::read_to_string(path).map_err(map_cli_source_read)?;
        templates.insert(relative, content);
    }

    if templates.is_empty() {
        return Err(TemplateError::new(
            "CLI_SOURCE_EMPTY",
            format!("No {} files under {}", TEMPLATE_EXTENSION, templates_dir.display()),
        ));
    }

    Ok(templates)
}
