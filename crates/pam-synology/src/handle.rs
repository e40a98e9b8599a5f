use std::ffi::CStr;
use std::ptr;

use nix::libc::{self, c_int, c_void};
use syno_auth::Error;

use crate::sys;

/// Key under which the session context is stored with `pam_set_data`.
const CONTEXT_KEY: &CStr = c"pam_synology";

/// Per-session state owned by PAM between hook invocations.
///
/// Created by `pam_sm_authenticate`, destroyed by PAM through
/// [`cleanup_context`] when the transaction ends.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext {
    pub verbose: bool,
}

/// Borrowed PAM handle for the duration of one hook call.
pub struct Handle(*mut sys::PamHandle);

impl Handle {
    /// Wrap the raw pointer a hook was called with.
    ///
    /// # Safety
    ///
    /// `pamh` must be the handle PAM passed to the current hook and must
    /// not be used concurrently.
    pub unsafe fn from_raw(pamh: *mut sys::PamHandle) -> Option<Self> {
        (!pamh.is_null()).then_some(Self(pamh))
    }

    /// Name of the user being authenticated.
    ///
    /// # Errors
    ///
    /// Returns the PAM status code when the user cannot be determined or
    /// the name is not UTF-8.
    pub fn user(&self) -> Result<String, c_int> {
        let mut user: *const libc::c_char = ptr::null();
        // SAFETY: the handle is valid for this hook; PAM owns the returned string.
        let rc = unsafe { sys::pam_get_user(self.0, &mut user, ptr::null()) };
        if rc != sys::PAM_SUCCESS {
            return Err(rc);
        }
        if user.is_null() {
            return Err(sys::PAM_USER_UNKNOWN);
        }
        // SAFETY: on success PAM hands out a NUL-terminated string.
        unsafe { CStr::from_ptr(user) }
            .to_str()
            .map(str::to_owned)
            .map_err(|_| sys::PAM_USER_UNKNOWN)
    }

    /// Ask the application for a secret with echo disabled.
    ///
    /// The buffer PAM allocated for the answer is zeroed before it is freed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HostConversationFailure`] if there is no
    /// conversation function, it fails, or it returns no answer.
    pub fn prompt_secret(&self, prompt: &str) -> Result<String, Error> {
        let failure = |reason: &str| Error::HostConversationFailure(reason.to_string());

        let mut item: *const c_void = ptr::null();
        // SAFETY: PAM_CONV items are `struct pam_conv` owned by the application.
        let rc = unsafe { sys::pam_get_item(self.0, sys::PAM_CONV, &mut item) };
        if rc != sys::PAM_SUCCESS || item.is_null() {
            return Err(failure("no conversation function available"));
        }
        // SAFETY: checked non-null above, and the item type is PAM_CONV.
        let conv = unsafe { &*item.cast::<sys::PamConv>() };
        let conv_fn = conv.conv.ok_or_else(|| failure("conversation function is null"))?;

        let prompt = std::ffi::CString::new(prompt).map_err(|_| failure("prompt contains NUL"))?;
        let message = sys::PamMessage {
            msg_style: sys::PAM_PROMPT_ECHO_OFF,
            msg: prompt.as_ptr(),
        };
        let messages = [ptr::addr_of!(message)];
        let mut responses: *mut sys::PamResponse = ptr::null_mut();

        let rc = conv_fn(1, messages.as_ptr(), &mut responses, conv.appdata_ptr);
        if rc != sys::PAM_SUCCESS {
            return Err(failure(&format!("conversation returned status {rc}")));
        }
        if responses.is_null() {
            return Err(failure("conversation returned no response"));
        }

        // SAFETY: on success the application allocated one response with malloc.
        let answer = unsafe { take_response(responses) };
        answer.ok_or_else(|| failure("missing or non UTF-8 answer"))
    }

    /// Store a fresh session context, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns the PAM status code if PAM refuses the data.
    pub fn set_context(&self, context: SessionContext) -> Result<(), c_int> {
        let data = Box::into_raw(Box::new(context));
        // SAFETY: PAM keeps the pointer and hands it back to `cleanup_context`.
        let rc = unsafe {
            sys::pam_set_data(
                self.0,
                CONTEXT_KEY.as_ptr(),
                data.cast::<c_void>(),
                Some(cleanup_context),
            )
        };
        if rc != sys::PAM_SUCCESS {
            // SAFETY: PAM did not take ownership.
            drop(unsafe { Box::from_raw(data) });
            return Err(rc);
        }
        Ok(())
    }

    /// Session context stored by an earlier `pam_sm_authenticate`, if any.
    pub fn context(&self) -> Option<SessionContext> {
        let mut data: *const c_void = ptr::null();
        // SAFETY: only this module stores data under CONTEXT_KEY.
        let rc = unsafe { sys::pam_get_data(self.0, CONTEXT_KEY.as_ptr(), &mut data) };
        if rc != sys::PAM_SUCCESS || data.is_null() {
            return None;
        }
        // SAFETY: the pointer was produced by `set_context` from a Box<SessionContext>.
        Some(unsafe { *data.cast::<SessionContext>() })
    }
}

/// Copy out the answer, then scrub and free what the application allocated.
///
/// # Safety
///
/// `responses` must point to one malloc'd `pam_response` whose `resp` is
/// either null or a malloc'd NUL-terminated string.
unsafe fn take_response(responses: *mut sys::PamResponse) -> Option<String> {
    let resp = unsafe { (*responses).resp };
    let answer = if resp.is_null() {
        None
    } else {
        let len = unsafe { libc::strlen(resp) };
        let answer = unsafe { CStr::from_ptr(resp) }
            .to_str()
            .ok()
            .map(str::to_owned);
        unsafe {
            ptr::write_bytes(resp, 0, len);
            libc::free(resp.cast::<c_void>());
        }
        answer
    };
    unsafe { libc::free(responses.cast::<c_void>()) };
    answer
}

extern "C" fn cleanup_context(_pamh: *mut sys::PamHandle, data: *mut c_void, _status: c_int) {
    if data.is_null() {
        return;
    }
    // SAFETY: PAM calls this exactly once with the pointer from `set_context`.
    let context = unsafe { Box::from_raw(data.cast::<SessionContext>()) };
    if context.verbose {
        tracing::info!("Cleaning up session context");
    }
}
