//! FFI layer for the mobile host.
//!
//! C-compatible functions callable from Swift or any other language with a C
//! FFI. All data crosses the boundary as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `tidy_*` functions are allocated by Rust
//! - Caller must free them with `tidy_string_free`
//! - Store pointers must be freed with `tidy_store_free`
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure

use crate::{
    clock::SystemClock, error::Result, snapshot::SnapshotMetadata, MemoryStore, ObjectId,
    RetentionPolicy, StoreSnapshot,
};
use std::ffi::{c_char, CStr, CString};

/// Result wrapper for FFI responses.
#[derive(serde::Serialize)]
#[serde(untagged)]
enum FfiResult<T: serde::Serialize> {
    Ok { ok: T },
    Err { error: String },
}

impl<T: serde::Serialize> FfiResult<T> {
    fn ok(value: T) -> Self {
        FfiResult::Ok { ok: value }
    }

    fn err(message: impl Into<String>) -> Self {
        FfiResult::Err {
            error: message.into(),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `tidy_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => c"{\"error\":\"string contained null bytes\"}"
            .to_owned()
            .into_raw(),
    }
}

/// Convert a C string pointer to a Rust string.
/// Returns None if pointer is null or invalid UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn error(message: impl Into<String>) -> *mut c_char {
    to_c_string(FfiResult::<()>::err(message).to_json())
}

/// Encode an engine result as a JSON envelope.
fn respond<T: serde::Serialize>(result: Result<T>) -> *mut c_char {
    match result {
        Ok(value) => to_c_string(FfiResult::ok(value).to_json()),
        Err(e) => error(e.to_string()),
    }
}

// ============================================================================
// Store Lifecycle
// ============================================================================

/// Create a new, empty store.
///
/// # Returns
/// Pointer to the store. Never null.
///
/// Caller must free the returned pointer with `tidy_store_free`.
#[no_mangle]
pub extern "C" fn tidy_store_new() -> *mut MemoryStore {
    Box::into_raw(Box::new(MemoryStore::new()))
}

/// Free a store.
///
/// # Safety
/// - `store` must be a valid pointer from `tidy_store_new`
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn tidy_store_free(store: *mut MemoryStore) {
    if !store.is_null() {
        drop(Box::from_raw(store));
    }
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from a `tidy_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn tidy_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Merge duplicate accounts, then duplicate blogs of every surviving account.
///
/// # Returns
/// JSON string: `{"ok": ReconcileReport}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `tidy_store_new` or null
/// - Caller must free the returned string with `tidy_string_free`
#[no_mangle]
pub unsafe extern "C" fn tidy_reconcile_accounts(store: *const MemoryStore) -> *mut c_char {
    let Some(store) = store.as_ref() else {
        return error("null store pointer");
    };
    respond(store.reconcile_accounts())
}

/// Merge duplicate blogs owned by one account.
///
/// # Returns
/// JSON string: `{"ok": ReconcileReport}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `tidy_store_new` or null
/// - Caller must free the returned string with `tidy_string_free`
#[no_mangle]
pub unsafe extern "C" fn tidy_reconcile_blogs(
    store: *const MemoryStore,
    account_id: ObjectId,
) -> *mut c_char {
    let Some(store) = store.as_ref() else {
        return error("null store pointer");
    };
    respond(store.reconcile_blogs(account_id))
}

// ============================================================================
// Hygiene
// ============================================================================

/// Delete cached like users fetched more than `retention_days` days ago.
///
/// `retention_days` must lie between zero and `MAX_RETENTION_DAYS`.
///
/// # Returns
/// JSON string: `{"ok": PurgeReport}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `tidy_store_new` or null
/// - Caller must free the returned string with `tidy_string_free`
#[no_mangle]
pub unsafe extern "C" fn tidy_purge_stale_cached_users(
    store: *const MemoryStore,
    retention_days: i64,
) -> *mut c_char {
    let Some(store) = store.as_ref() else {
        return error("null store pointer");
    };
    let policy = match RetentionPolicy::try_days(retention_days) {
        Ok(policy) => policy,
        Err(e) => return error(e.to_string()),
    };
    respond(store.purge_stale_cached_users(policy.max_age, &SystemClock))
}

/// Delete synced orphan posts and detach blogs of missing accounts.
///
/// # Returns
/// JSON string: `{"ok": SanitizeReport}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `tidy_store_new` or null
/// - Caller must free the returned string with `tidy_string_free`
#[no_mangle]
pub unsafe extern "C" fn tidy_sanitize_orphans(store: *const MemoryStore) -> *mut c_char {
    let Some(store) = store.as_ref() else {
        return error("null store pointer");
    };
    respond(store.sanitize_orphans())
}

/// Delete one account if it is not the default and owns no blogs.
///
/// Meant to be called after the host deleted a site of that account.
///
/// # Returns
/// JSON string: `{"ok": true}` if the account was deleted, `{"ok": false}` if
/// it was kept, or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `tidy_store_new` or null
/// - Caller must free the returned string with `tidy_string_free`
#[no_mangle]
pub unsafe extern "C" fn tidy_purge_account_if_unused(
    store: *const MemoryStore,
    account_id: ObjectId,
) -> *mut c_char {
    let Some(store) = store.as_ref() else {
        return error("null store pointer");
    };
    respond(store.purge_account_if_unused(account_id))
}

// ============================================================================
// Persistence
// ============================================================================

/// Export store state as a snapshot.
///
/// # Returns
/// JSON string: `{"ok": StoreSnapshot}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `tidy_store_new` or null
/// - Caller must free the returned string with `tidy_string_free`
#[no_mangle]
pub unsafe extern "C" fn tidy_store_export(store: *const MemoryStore) -> *mut c_char {
    let Some(store) = store.as_ref() else {
        return error("null store pointer");
    };
    respond(store.export_state())
}

/// Replace store state with a snapshot.
///
/// # Arguments
/// - `snapshot_json`: JSON string of StoreSnapshot
///
/// # Returns
/// JSON string: `{"ok": null}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `tidy_store_new` or null
/// - `snapshot_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `tidy_string_free`
#[no_mangle]
pub unsafe extern "C" fn tidy_store_import(
    store: *const MemoryStore,
    snapshot_json: *const c_char,
) -> *mut c_char {
    let Some(store) = store.as_ref() else {
        return error("null store pointer");
    };
    let Some(json) = from_c_string(snapshot_json) else {
        return error("invalid snapshot JSON");
    };
    respond(StoreSnapshot::from_json(&json).and_then(|snapshot| store.import_state(snapshot)))
}

/// Row counts of the current state without a full export.
///
/// # Returns
/// JSON string: `{"ok": SnapshotMetadata}` or `{"error": "message"}`
///
/// # Safety
/// - `store` must be a valid pointer from `tidy_store_new` or null
/// - Caller must free the returned string with `tidy_string_free`
#[no_mangle]
pub unsafe extern "C" fn tidy_store_metadata(store: *const MemoryStore) -> *mut c_char {
    let Some(store) = store.as_ref() else {
        return error("null store pointer");
    };
    respond(
        store
            .export_state()
            .map(|snapshot| SnapshotMetadata::from(&snapshot)),
    )
}

// ============================================================================
// Utility
// ============================================================================

/// Get the engine version.
///
/// # Returns
/// Static string pointer (do not free)
#[no_mangle]
pub extern "C" fn tidy_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

/// Get the snapshot format version.
#[no_mangle]
pub extern "C" fn tidy_snapshot_format_version() -> u32 {
    crate::SNAPSHOT_FORMAT_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    const SNAPSHOT: &str = r#"{
        "formatVersion": 1,
        "lastId": 5,
        "accounts": {
            "1": {"id": 1, "userId": 7, "username": "ann", "isDefault": true},
            "2": {"id": 2, "userId": 7, "username": "ann", "isDefault": false}
        },
        "blogs": {
            "3": {"id": 3, "accountId": 1, "dotComId": 42, "url": "https://a.example"},
            "4": {"id": 4, "accountId": 2, "dotComId": 42, "url": "https://a.example"}
        },
        "posts": {
            "5": {"id": 5, "blogId": 4, "postId": null, "title": "draft"}
        }
    }"#;

    unsafe fn take(s: *mut c_char) -> serde_json::Value {
        let json = CStr::from_ptr(s).to_str().unwrap().to_string();
        tidy_string_free(s);
        serde_json::from_str(&json).unwrap()
    }

    unsafe fn seeded() -> *mut MemoryStore {
        let store = tidy_store_new();
        let snapshot = CString::new(SNAPSHOT).unwrap();
        let result = take(tidy_store_import(store, snapshot.as_ptr()));
        assert!(result.get("ok").is_some(), "{result}");
        store
    }

    #[test]
    fn ffi_store_lifecycle() {
        unsafe {
            let store = tidy_store_new();
            assert!(!store.is_null());
            tidy_store_free(store);
        }
    }

    #[test]
    fn ffi_reconcile_accounts() {
        unsafe {
            let store = seeded();

            let report = take(tidy_reconcile_accounts(store));
            assert_eq!(report["ok"]["committed"], true);
            assert_eq!(report["ok"]["merged"][0]["survivor"], 1);
            assert_eq!(report["ok"]["merged"][1]["kind"], "blog");

            let metadata = take(tidy_store_metadata(store));
            assert_eq!(metadata["ok"]["accountCount"], 1);
            assert_eq!(metadata["ok"]["blogCount"], 1);
            assert_eq!(metadata["ok"]["postCount"], 1);

            tidy_store_free(store);
        }
    }

    #[test]
    fn ffi_reconcile_blogs_of_missing_account() {
        unsafe {
            let store = seeded();
            let result = take(tidy_reconcile_blogs(store, 99));
            assert!(result["error"].as_str().unwrap().contains("not found"));
            tidy_store_free(store);
        }
    }

    #[test]
    fn ffi_hygiene_passes() {
        unsafe {
            let store = seeded();

            let purge = take(tidy_purge_stale_cached_users(store, 7));
            assert_eq!(purge["ok"]["committed"], false);

            let sanitize = take(tidy_sanitize_orphans(store));
            assert_eq!(sanitize["ok"]["committed"], false);

            let invalid = take(tidy_purge_stale_cached_users(store, -1));
            assert!(invalid.get("error").is_some());

            tidy_store_free(store);
        }
    }

    #[test]
    fn ffi_purge_rejects_retention_beyond_the_calendar() {
        unsafe {
            let store = seeded();

            let result = take(tidy_purge_stale_cached_users(store, 100_000_000));
            assert_eq!(
                result["error"],
                "retention of 100000000 days is out of range"
            );

            let widest = take(tidy_purge_stale_cached_users(
                store,
                crate::MAX_RETENTION_DAYS,
            ));
            assert_eq!(widest["ok"]["committed"], false);

            tidy_store_free(store);
        }
    }

    #[test]
    fn ffi_purge_account_if_unused() {
        unsafe {
            let store = seeded();

            // Both seeded accounts still own a blog.
            let kept = take(tidy_purge_account_if_unused(store, 2));
            assert_eq!(kept["ok"], false);

            let missing = take(tidy_purge_account_if_unused(store, 99));
            assert!(missing["error"].as_str().unwrap().contains("not found"));

            tidy_store_free(store);
        }
    }

    #[test]
    fn ffi_store_export_import() {
        unsafe {
            let store = seeded();

            let exported = take(tidy_store_export(store));
            assert_eq!(exported["ok"]["lastId"], 5);
            let snapshot = CString::new(exported["ok"].to_string()).unwrap();

            let copy = tidy_store_new();
            let result = take(tidy_store_import(copy, snapshot.as_ptr()));
            assert!(result.get("ok").is_some());

            let metadata = take(tidy_store_metadata(copy));
            assert_eq!(metadata["ok"]["accountCount"], 2);

            tidy_store_free(store);
            tidy_store_free(copy);
        }
    }

    #[test]
    fn ffi_version() {
        unsafe {
            let version = tidy_version();
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, env!("CARGO_PKG_VERSION"));
        }
        assert_eq!(tidy_snapshot_format_version(), crate::SNAPSHOT_FORMAT_VERSION);
    }

    #[test]
    fn ffi_error_handling() {
        unsafe {
            let result = take(tidy_reconcile_accounts(ptr::null()));
            assert!(result.get("error").is_some());

            let store = tidy_store_new();
            let invalid = CString::new("not valid json").unwrap();
            let result = take(tidy_store_import(store, invalid.as_ptr()));
            assert!(result.get("error").is_some());

            let result = take(tidy_store_import(store, ptr::null()));
            assert!(result.get("error").is_some());

            tidy_store_free(store);
        }
    }
}
