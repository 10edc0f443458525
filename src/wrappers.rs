//! Stock wrappers for [`CapabilityBinder::wrap`](crate::capability::CapabilityBinder::wrap).

use crate::capability::{Args, CapabilityFn, CapabilityName, Wrapper};
use crate::error::SandboxError;
use std::rc::Rc;
use tracing::{debug, warn};

/// Log every call and every failure of the wrapped capability.
pub fn traced() -> Wrapper {
    Rc::new(|name: CapabilityName, inner: CapabilityFn| -> CapabilityFn {
        Rc::new(move |args: &Args| {
            debug!(capability = %name, args = args.len(), "Calling capability");
            let result = inner(args);
            if let Err(e) = &result {
                warn!(capability = %name, error = %e, "Capability failed");
            }
            result
        })
    })
}

/// Reject calls with fewer than `count` arguments before they reach the
/// wrapped capability.
pub fn require_args(count: usize) -> Wrapper {
    Rc::new(move |name: CapabilityName, inner: CapabilityFn| -> CapabilityFn {
        Rc::new(move |args: &Args| {
            if args.len() < count {
                warn!(capability = %name, expected = count, got = args.len(), "Too few arguments");
                return Err(SandboxError::bad_argument(
                    name.as_str(),
                    format!("expected at least {count} arguments, got {}", args.len()),
                ));
            }
            inner(args)
        })
    })
}
