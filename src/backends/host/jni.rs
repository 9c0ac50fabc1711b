// SPDX-License-Identifier: GPL-3.0-only

//! JVM host runtime
//!
//! Frames are published to a Java object through a direct
//! `java.nio.ByteBuffer` wrapping the session's frame buffer, and a handler
//! method with signature `(Ljava/nio/ByteBuffer;)V`. Every open session has
//! its own ByteBuffer, looked up by the address of the memory it wraps.
//! Driver threads attach through the raw invocation interface so they carry a
//! readable thread name inside the VM; detaching is left to the bridge's
//! per-thread registry.

use std::collections::HashMap;
use std::ffi::{CString, c_void};
use std::ptr;
use std::sync::{Mutex, PoisonError};

use jni::objects::{GlobalRef, JMethodID, JObject};
use jni::signature::{Primitive, ReturnType};
use jni::sys::{self, jvalue};
use jni::{JNIEnv, JavaVM};
use tracing::{debug, error};

use super::HostRuntime;
use super::types::*;

/// JNI signature of the frame handler method
pub const FRAME_HANDLER_SIGNATURE: &str = "(Ljava/nio/ByteBuffer;)V";

impl From<jni::errors::Error> for HostError {
    fn from(err: jni::errors::Error) -> Self {
        HostError::InvocationFailed(err.to_string())
    }
}

pub struct JniRuntime {
    vm: JavaVM,
    target: GlobalRef,
    on_data: JMethodID,
    buffers: Mutex<HashMap<usize, GlobalRef>>,
}

impl JniRuntime {
    /// Bind to `method` on `target`, using the env of the calling thread
    ///
    /// The target object is kept alive with a global reference for the
    /// lifetime of the runtime.
    pub fn new(env: &mut JNIEnv<'_>, target: &JObject<'_>, method: &str) -> HostResult<Self> {
        let vm = env.get_java_vm()?;
        let target = env.new_global_ref(target)?;
        let class = env.get_object_class(target.as_obj())?;
        let on_data = env.get_method_id(&class, method, FRAME_HANDLER_SIGNATURE)?;

        Ok(Self {
            vm,
            target,
            on_data,
            buffers: Mutex::new(HashMap::new()),
        })
    }
}

impl HostRuntime for JniRuntime {
    fn attach_current_thread(&self, thread_name: &str) -> HostResult<RuntimeHandle> {
        let name = CString::new(thread_name)
            .map_err(|e| HostError::AttachFailed(format!("bad thread name: {}", e)))?;
        let vm = self.vm.get_java_vm_pointer();
        let mut env: *mut c_void = ptr::null_mut();
        let mut args = sys::JavaVMAttachArgs {
            version: sys::JNI_VERSION_1_6,
            name: name.as_ptr() as *mut _,
            group: ptr::null_mut(),
        };

        let status = unsafe {
            let attach = (**vm)
                .AttachCurrentThread
                .ok_or_else(|| HostError::AttachFailed("AttachCurrentThread missing".to_string()))?;
            attach(vm, &mut env, &mut args as *mut _ as *mut c_void)
        };
        if status != sys::JNI_OK {
            return Err(HostError::AttachFailed(format!("JNI status {}", status)));
        }

        RuntimeHandle::from_raw(env as usize)
            .ok_or_else(|| HostError::AttachFailed("VM returned a null env".to_string()))
    }

    fn detach_current_thread(&self) {
        debug!("Detaching thread from VM");
        let vm = self.vm.get_java_vm_pointer();
        unsafe {
            if let Some(detach) = (**vm).DetachCurrentThread {
                let status = detach(vm);
                if status != sys::JNI_OK {
                    error!(status, "DetachCurrentThread failed");
                }
            }
        }
    }

    fn expose_buffer(&self, view: BufferView) -> HostResult<()> {
        let mut env = self
            .vm
            .get_env()
            .map_err(|e| HostError::ExposeFailed(e.to_string()))?;
        let buffer = unsafe { env.new_direct_byte_buffer(view.as_ptr(), view.len()) }
            .map_err(|e| HostError::ExposeFailed(e.to_string()))?;
        let global = env
            .new_global_ref(&buffer)
            .map_err(|e| HostError::ExposeFailed(e.to_string()))?;

        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(view.as_ptr() as usize, global);
        Ok(())
    }

    fn retract_buffer(&self, view: BufferView) {
        // Dropping the global ref releases it, attaching briefly if needed
        let removed = self
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(view.as_ptr() as usize));
        if removed.is_none() {
            debug!(len = view.len(), "Retracting a buffer that was never exposed");
        }
    }

    fn invoke_frame_handler(
        &self,
        handle: RuntimeHandle,
        delivery: &FrameDelivery<'_>,
    ) -> HostResult<()> {
        let buffer = self
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(delivery.view.as_ptr() as usize))
            .cloned()
            .ok_or(HostError::NoBuffer)?;
        let mut env = unsafe { JNIEnv::from_raw(handle.as_raw() as *mut sys::JNIEnv) }?;

        let args = [jvalue {
            l: buffer.as_obj().as_raw(),
        }];
        unsafe {
            env.call_method_unchecked(
                self.target.as_obj(),
                self.on_data,
                ReturnType::Primitive(Primitive::Void),
                &args,
            )
        }?;
        Ok(())
    }

    fn take_pending_failure(&self, handle: RuntimeHandle) -> Option<String> {
        let env = unsafe { JNIEnv::from_raw(handle.as_raw() as *mut sys::JNIEnv) }.ok()?;
        match env.exception_check() {
            Ok(true) => {
                let _ = env.exception_describe();
                let _ = env.exception_clear();
                Some("exception thrown by frame handler".to_string())
            }
            _ => None,
        }
    }
}
