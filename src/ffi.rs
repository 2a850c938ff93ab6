//! FFI bindings for the vitality engine
//!
//! This module provides C-compatible functions for calling the engine from
//! the mobile apps. All functions take and return JSON in C strings
//! (null-terminated). Returned strings are allocated here and must be freed
//! by the caller using `vitality_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde::Serialize;

use crate::adapters::Provider;
use crate::config::VitalityConfig;
use crate::pipeline::{
    provider_to_vitality, summary_to_vitality, BadgeRequest, TrendRequest, VitalityProcessor,
};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

/// Read a required string argument, recording an error when it is unusable
unsafe fn required_arg(ptr: *const c_char, name: &str) -> Option<String> {
    let value = cstr_to_string(ptr);
    if value.is_none() {
        set_last_error(&format!("Invalid {} string pointer", name));
    }
    value
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Serialize a result to a newly allocated JSON C string
fn json_to_cstr<T: Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn age_from_c(age: i32) -> Option<u32> {
    match u32::try_from(age) {
        Ok(age) => Some(age),
        Err(_) => {
            set_last_error("Age must not be negative");
            None
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Score a single-day summary payload.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated JSON day result that must be freed with `vitality_free_string`.
/// - Returns NULL on error; call `vitality_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitality_score_summary(json: *const c_char, age: i32) -> *mut c_char {
    clear_last_error();

    let Some(json_str) = required_arg(json, "JSON") else {
        return ptr::null_mut();
    };
    let Some(age) = age_from_c(age) else {
        return ptr::null_mut();
    };

    match summary_to_vitality(&json_str, age) {
        Ok(day) => json_to_cstr(&day),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Adapt and score a provider payload (`summary`, `whoop`, `garmin` or `csv`).
///
/// # Safety
/// - `provider` and `raw` must be valid null-terminated C strings.
/// - Returns a newly allocated JSON array of day results that must be freed
///   with `vitality_free_string`.
/// - Returns NULL on error; call `vitality_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitality_score_provider(
    provider: *const c_char,
    raw: *const c_char,
    age: i32,
) -> *mut c_char {
    clear_last_error();

    let Some(provider_str) = required_arg(provider, "provider") else {
        return ptr::null_mut();
    };
    let Some(raw_str) = required_arg(raw, "payload") else {
        return ptr::null_mut();
    };
    let Some(age) = age_from_c(age) else {
        return ptr::null_mut();
    };

    let result = Provider::parse(&provider_str)
        .and_then(|provider| provider_to_vitality(provider, &raw_str, age));
    match result {
        Ok(days) => json_to_cstr(&days),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Compute family trends from a trend request.
///
/// # Safety
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `vitality_free_string`.
/// - Returns NULL on error; call `vitality_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitality_compute_trends(request_json: *const c_char) -> *mut c_char {
    clear_last_error();
    compute_trends_with(&VitalityProcessor::new(), request_json)
}

/// Compute daily and weekly badges from a badge request.
///
/// # Safety
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `vitality_free_string`.
/// - Returns NULL on error; call `vitality_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitality_compute_badges(request_json: *const c_char) -> *mut c_char {
    clear_last_error();
    compute_badges_with(&VitalityProcessor::new(), request_json)
}

unsafe fn compute_trends_with(
    processor: &VitalityProcessor,
    request_json: *const c_char,
) -> *mut c_char {
    let Some(json_str) = required_arg(request_json, "request") else {
        return ptr::null_mut();
    };
    match serde_json::from_str::<TrendRequest>(&json_str) {
        Ok(request) => json_to_cstr(&processor.compute_trends(&request)),
        Err(e) => {
            set_last_error(&format!("Invalid trend request: {}", e));
            ptr::null_mut()
        }
    }
}

unsafe fn compute_badges_with(
    processor: &VitalityProcessor,
    request_json: *const c_char,
) -> *mut c_char {
    let Some(json_str) = required_arg(request_json, "request") else {
        return ptr::null_mut();
    };
    match serde_json::from_str::<BadgeRequest>(&json_str) {
        Ok(request) => json_to_cstr(&processor.compute_badges(&request)),
        Err(e) => {
            set_last_error(&format!("Invalid badge request: {}", e));
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Configured Processor API
// ============================================================================

/// Opaque handle to a VitalityProcessor
pub struct VitalityProcessorHandle {
    processor: VitalityProcessor,
}

/// Create a processor from a configuration JSON, or defaults when NULL.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Must be freed with `vitality_processor_free`.
/// - Returns NULL on error; call `vitality_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitality_processor_new(
    config_json: *const c_char,
) -> *mut VitalityProcessorHandle {
    clear_last_error();

    let processor = if config_json.is_null() {
        VitalityProcessor::new()
    } else {
        let Some(json_str) = required_arg(config_json, "config") else {
            return ptr::null_mut();
        };
        match VitalityConfig::from_json(&json_str).and_then(VitalityProcessor::with_config) {
            Ok(processor) => processor,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    Box::into_raw(Box::new(VitalityProcessorHandle { processor }))
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `vitality_processor_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn vitality_processor_free(processor: *mut VitalityProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Compute family trends with a configured processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `vitality_processor_new`.
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `vitality_free_string`.
/// - Returns NULL on error; call `vitality_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitality_processor_compute_trends(
    processor: *const VitalityProcessorHandle,
    request_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    compute_trends_with(&(*processor).processor, request_json)
}

/// Compute badges with a configured processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `vitality_processor_new`.
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `vitality_free_string`.
/// - Returns NULL on error; call `vitality_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vitality_processor_compute_badges(
    processor: *const VitalityProcessorHandle,
    request_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    compute_badges_with(&(*processor).processor, request_json)
}

/// Free a string returned by vitality functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a vitality function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn vitality_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next vitality function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn vitality_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn vitality_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_summary_json() -> CString {
        CString::new(
            r#"{
            "sleep_summary": {
                "duration": { "sleep_duration_seconds": 27000, "time_in_bed_seconds": 28800 },
                "heart_rate": { "hr_resting_bpm": 58, "hrv_rmssd_avg_ms": 42.7 }
            },
            "physical_summary": {
                "activity": { "steps": 9100 },
                "calories": { "total_calories": 2340.8 }
            }
        }"#,
        )
        .unwrap()
    }

    fn take_string(ptr: *mut c_char) -> serde_json::Value {
        assert!(!ptr.is_null());
        unsafe {
            let value = serde_json::from_str(CStr::from_ptr(ptr).to_str().unwrap()).unwrap();
            vitality_free_string(ptr);
            value
        }
    }

    #[test]
    fn test_ffi_score_summary() {
        let json = sample_summary_json();
        let day = take_string(unsafe { vitality_score_summary(json.as_ptr(), 41) });

        assert_eq!(day["outcome"]["status"], "scored");
        assert_eq!(day["raw"]["hrv"]["kind"], "rmssd");
        assert_eq!(day["raw"]["hrv"]["ms"], 42.7);
        assert!(day["raw"]["active_calories"].is_null());
    }

    #[test]
    fn test_ffi_score_provider_csv() {
        let provider = CString::new("csv").unwrap();
        let raw = CString::new("date,sleep_hours,steps,hrv_ms,resting_hr\n2024-01-15,7.4,10234,52.3,57\n")
            .unwrap();
        let days = take_string(unsafe { vitality_score_provider(provider.as_ptr(), raw.as_ptr(), 52) });
        assert_eq!(days.as_array().unwrap().len(), 1);
        assert_eq!(days[0]["date"], "2024-01-15");
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        let config = CString::new(r#"{ "trends": { "min_days": 10 } }"#).unwrap();
        let request = CString::new(r#"{ "now": "2024-03-21T12:00:00Z", "members": [] }"#).unwrap();
        unsafe {
            let processor = vitality_processor_new(config.as_ptr());
            assert!(!processor.is_null());

            let response =
                take_string(vitality_processor_compute_trends(processor, request.as_ptr()));
            assert_eq!(
                response["report"]["coverage"]["required_days_for_any_insight"],
                10
            );

            let badges =
                take_string(vitality_processor_compute_badges(processor, request.as_ptr()));
            assert!(badges["daily"].as_array().unwrap().is_empty());

            vitality_processor_free(processor);

            let defaults = vitality_processor_new(ptr::null());
            assert!(!defaults.is_null());
            vitality_processor_free(defaults);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid_json = CString::new("not json").unwrap();
            assert!(vitality_score_summary(invalid_json.as_ptr(), 30).is_null());
            let error = vitality_last_error();
            assert!(!error.is_null());
            assert!(!CStr::from_ptr(error).to_str().unwrap().is_empty());

            let provider = CString::new("fitbit").unwrap();
            assert!(vitality_score_provider(provider.as_ptr(), invalid_json.as_ptr(), 30).is_null());
            let error_str = CStr::from_ptr(vitality_last_error()).to_str().unwrap();
            assert!(error_str.contains("fitbit"));

            assert!(vitality_compute_trends(ptr::null()).is_null());
            assert!(vitality_score_summary(sample_summary_json().as_ptr(), -1).is_null());

            let bad_config = CString::new(r#"{ "trends": { "window_days": 3 } }"#).unwrap();
            assert!(vitality_processor_new(bad_config.as_ptr()).is_null());

            let huge_age =
                CString::new(r#"{ "freshness": { "max_age_days": 9223372036854775807 } }"#).unwrap();
            assert!(vitality_processor_new(huge_age.as_ptr()).is_null());
            let error_str = CStr::from_ptr(vitality_last_error()).to_str().unwrap();
            assert!(error_str.contains("max_age_days"));
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = vitality_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
