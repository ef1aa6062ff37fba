//! Model file format detection from file extensions

use std::collections::BTreeSet;

/// Known model file extensions and the format they indicate
const FORMAT_EXTENSIONS: &[(&str, &str)] = &[
    (".safetensors", "safetensors"),
    (".bin", "pytorch"),
    (".pt", "pytorch"),
    (".pth", "pytorch"),
    (".gguf", "gguf"),
    (".ggml", "ggml"),
    (".onnx", "onnx"),
];

/// Detect the model format of a single file
pub fn detect_format(filename: &str) -> Option<&'static str> {
    let name = filename.rsplit('/').next().unwrap_or(filename);
    FORMAT_EXTENSIONS
        .iter()
        .find(|(ext, _)| name.ends_with(ext))
        .map(|(_, format)| *format)
}

/// Detect all formats present in a set of files, sorted and de-duplicated
pub fn detect_formats_from_files<I, S>(filenames: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    filenames
        .into_iter()
        .filter_map(|f| detect_format(f.as_ref()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}
