//! FFI bindings for facial-state
//!
//! This module provides C-compatible functions for calling the analyzer from other languages.
//! Landmarks go in and results come out as JSON in null-terminated C strings.
//! Returned strings are allocated here and must be freed with `facestate_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::automaton::decide_values;
use crate::config::{PipelineConfig, DEFAULT_THRESHOLD};
use crate::error::AnalysisError;
use crate::extractor::{parse_landmark_json, StaticExtractor};
use crate::pipeline::FacialStatePipeline;
use crate::turing::majority_machine;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Hand a JSON result to the caller, or record the error and return NULL
fn respond(result: Result<String, AnalysisError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn analyze_json(
    pipeline: &FacialStatePipeline<StaticExtractor>,
    neutral: &str,
    target: &str,
) -> Result<String, AnalysisError> {
    let neutral = parse_landmark_json(neutral)?;
    let target = parse_landmark_json(target)?;
    let outcome = pipeline.analyze(&neutral, &target);
    Ok(serde_json::to_string(&outcome)?)
}

// ============================================================================
// Stateless API
// ============================================================================

/// Compare two landmark sets and return the outcome JSON.
///
/// Landmarks use the JSON forms accepted by `parse_landmark_json`; `null`
/// means no face. A `threshold` that is not positive selects the default.
///
/// # Safety
/// - `neutral_json` and `target_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `facestate_free_string`.
/// - Returns NULL on error; call `facestate_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn facestate_analyze_landmarks(
    neutral_json: *const c_char,
    target_json: *const c_char,
    threshold: f64,
) -> *mut c_char {
    clear_last_error();

    let neutral = match cstr_to_string(neutral_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid neutral landmark string pointer");
            return ptr::null_mut();
        }
    };

    let target = match cstr_to_string(target_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid target landmark string pointer");
            return ptr::null_mut();
        }
    };

    let threshold = if threshold.is_finite() && threshold > 0.0 {
        threshold
    } else {
        DEFAULT_THRESHOLD
    };
    let config = PipelineConfig::default().with_threshold(threshold);

    respond(
        FacialStatePipeline::with_config(StaticExtractor, config)
            .and_then(|pipeline| analyze_json(&pipeline, &neutral, &target)),
    )
}

/// Decide a JSON array of 0/1 symbols by first symbol and by majority.
///
/// Entries outside {0, 1}, including non-numbers, give a reject decision.
///
/// # Safety
/// - `vector_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `facestate_free_string`.
/// - Returns NULL on error; call `facestate_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn facestate_decide_vector(vector_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json = match cstr_to_string(vector_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid vector string pointer");
            return ptr::null_mut();
        }
    };

    respond(
        serde_json::from_str::<Vec<serde_json::Value>>(&json)
            .and_then(|vector| serde_json::to_string(&decide_values(&vector)))
            .map_err(AnalysisError::from),
    )
}

/// Build the majority machine for inputs of `length` symbols and return its JSON spec.
///
/// # Safety
/// - Returns a newly allocated string that must be freed with `facestate_free_string`.
/// - Returns NULL on error; call `facestate_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn facestate_majority_machine(length: u32) -> *mut c_char {
    clear_last_error();

    respond(
        majority_machine(length as usize)
            .and_then(|machine| Ok(serde_json::to_string(machine.spec())?)),
    )
}

// ============================================================================
// Configured Pipeline API
// ============================================================================

/// Opaque handle to a configured pipeline
pub struct FacialStatePipelineHandle {
    pipeline: FacialStatePipeline<StaticExtractor>,
}

/// Create a pipeline from a configuration JSON document.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string, or NULL for defaults.
/// - Must be freed with `facestate_pipeline_free`.
/// - Returns NULL on error; call `facestate_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn facestate_pipeline_new(
    config_json: *const c_char,
) -> *mut FacialStatePipelineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        Ok(PipelineConfig::default())
    } else {
        match cstr_to_string(config_json) {
            Some(json) => PipelineConfig::from_json(&json),
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        }
    };

    match config.and_then(|c| FacialStatePipeline::with_config(StaticExtractor, c)) {
        Ok(pipeline) => Box::into_raw(Box::new(FacialStatePipelineHandle { pipeline })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a pipeline.
///
/// # Safety
/// - `pipeline` must be a valid pointer returned by `facestate_pipeline_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn facestate_pipeline_free(pipeline: *mut FacialStatePipelineHandle) {
    if !pipeline.is_null() {
        drop(Box::from_raw(pipeline));
    }
}

/// Compare two landmark sets with a configured pipeline.
///
/// # Safety
/// - `pipeline` must be a valid pointer returned by `facestate_pipeline_new`.
/// - `neutral_json` and `target_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `facestate_free_string`.
/// - Returns NULL on error; call `facestate_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn facestate_pipeline_analyze(
    pipeline: *const FacialStatePipelineHandle,
    neutral_json: *const c_char,
    target_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(handle) = pipeline.as_ref() else {
        set_last_error("Null pipeline pointer");
        return ptr::null_mut();
    };

    let (Some(neutral), Some(target)) = (cstr_to_string(neutral_json), cstr_to_string(target_json))
    else {
        set_last_error("Invalid landmark string pointer");
        return ptr::null_mut();
    };

    respond(analyze_json(&handle.pipeline, &neutral, &target))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by facestate functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a facestate function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn facestate_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next facestate function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn facestate_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn facestate_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
