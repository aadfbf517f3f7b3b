//! # Android `UsbManager` Host
//!
//! Implements [`AccessoryHost`] on top of `android.hardware.usb.UsbManager`
//! through JNI:
//!
//! ```text
//! accessories()     ──► UsbManager.getAccessoryList()
//! open_accessory()  ──► UsbManager.openAccessory(acc)
//!                         └─► ParcelFileDescriptor.detachFd() ──► OwnedDescriptor
//! ```
//!
//! The detached fd is owned by Rust from then on; the stream pair are
//! duplicates of it.

use std::fmt;
use std::fs::File;
use std::os::fd::{FromRawFd, OwnedFd};

use adktoolkit::{AccessoryHost, AdkError, AdkResult, OwnedDescriptor};
use jni::errors::Error as JniError;
use jni::objects::{GlobalRef, JObject, JObjectArray, JString, JValue};
use jni::{JNIEnv, JavaVM};
use log::{debug, warn};

use crate::BridgeError;

const USB_ACCESSORY_CLASS: &str = "android/hardware/usb/UsbAccessory";
const SECURITY_EXCEPTION_CLASS: &str = "java/lang/SecurityException";

/// The fields `UsbAccessory.equals` compares
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AccessoryIdentity {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub uri: Option<String>,
    pub serial: Option<String>,
}

impl AccessoryIdentity {
    /// Read the identity of a `UsbAccessory` object
    pub fn read(env: &mut JNIEnv, accessory: &JObject) -> Result<Self, BridgeError> {
        Ok(Self {
            manufacturer: string_getter(env, accessory, "getManufacturer")?,
            model: string_getter(env, accessory, "getModel")?,
            description: string_getter(env, accessory, "getDescription")?,
            version: string_getter(env, accessory, "getVersion")?,
            uri: string_getter(env, accessory, "getUri")?,
            serial: string_getter(env, accessory, "getSerial")?,
        })
    }
}

/// An attached accessory: a global ref to the Java object plus its identity
///
/// Equality compares identity only, matching `UsbAccessory.equals`.
#[derive(Clone)]
pub struct AndroidAccessory {
    object: GlobalRef,
    identity: AccessoryIdentity,
}

impl AndroidAccessory {
    pub fn from_object(env: &mut JNIEnv, object: &JObject) -> Result<Self, BridgeError> {
        let identity = AccessoryIdentity::read(env, object)?;
        Ok(Self {
            object: env.new_global_ref(object)?,
            identity,
        })
    }

    pub fn identity(&self) -> &AccessoryIdentity {
        &self.identity
    }
}

impl PartialEq for AndroidAccessory {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl fmt::Debug for AndroidAccessory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AndroidAccessory")
            .field("manufacturer", &self.identity.manufacturer)
            .field("model", &self.identity.model)
            .field("version", &self.identity.version)
            .finish()
    }
}

/// Accessory host backed by Android's `UsbManager`
pub struct AndroidUsbHost {
    vm: JavaVM,
    usb_manager: GlobalRef,
}

impl AndroidUsbHost {
    /// Wrap an explicit `UsbManager` instance
    pub fn from_usb_manager(env: &mut JNIEnv, usb_manager: &JObject) -> Result<Self, BridgeError> {
        if usb_manager.is_null() {
            return Err(BridgeError::Adk(AdkError::Host("UsbManager is null")));
        }
        Ok(Self {
            vm: env.get_java_vm()?,
            usb_manager: env.new_global_ref(usb_manager)?,
        })
    }

    /// Look up `UsbManager` through the process-wide Android context
    #[cfg(target_os = "android")]
    pub fn from_process_context() -> Result<Self, BridgeError> {
        let ctx = ndk_context::android_context();
        // SAFETY: ndk-context hands out the process JavaVM and a global ref
        // to the application context, both valid for the process lifetime.
        let vm = unsafe { JavaVM::from_raw(ctx.vm().cast()) }?;
        let context = unsafe { JObject::from_raw(ctx.context().cast()) };

        let usb_manager = {
            let mut env = vm.attach_current_thread()?;
            let service = env.new_string("usb")?;
            let manager = env
                .call_method(
                    &context,
                    "getSystemService",
                    "(Ljava/lang/String;)Ljava/lang/Object;",
                    &[JValue::Object(&service)],
                )?
                .l()?;
            if manager.is_null() {
                return Err(BridgeError::Adk(AdkError::Host("USB service unavailable")));
            }
            env.new_global_ref(&manager)?
        };

        Ok(Self { vm, usb_manager })
    }

    fn list(&self) -> Result<Vec<AndroidAccessory>, BridgeError> {
        let mut env = self.vm.attach_current_thread()?;
        let usb_manager = self.usb_manager.as_obj();
        env.with_local_frame(16, |env| -> Result<_, BridgeError> {
            let list = env
                .call_method(
                    usb_manager,
                    "getAccessoryList",
                    "()[Landroid/hardware/usb/UsbAccessory;",
                    &[],
                )?
                .l()?;
            if list.is_null() {
                return Ok(Vec::new());
            }

            let list = JObjectArray::from(list);
            let len = env.get_array_length(&list)?;
            let mut accessories = Vec::with_capacity(len as usize);
            for i in 0..len {
                let object = env.get_object_array_element(&list, i)?;
                if object.is_null() {
                    continue;
                }
                accessories.push(AndroidAccessory::from_object(env, &object)?);
                env.delete_local_ref(object)?;
            }
            Ok(accessories)
        })
    }

    fn bind(&self, accessory: &AndroidAccessory) -> Result<OwnedDescriptor, BridgeError> {
        let mut env = self.vm.attach_current_thread()?;
        let opened = env.call_method(
            self.usb_manager.as_obj(),
            "openAccessory",
            "(Landroid/hardware/usb/UsbAccessory;)Landroid/os/ParcelFileDescriptor;",
            &[JValue::Object(accessory.object.as_obj())],
        );

        let descriptor = match opened {
            Ok(value) => value.l()?,
            Err(JniError::JavaException) => {
                let denied = clear_exception_is(&mut env, SECURITY_EXCEPTION_CLASS)?;
                return Err(BridgeError::Adk(if denied {
                    AdkError::PermissionDenied
                } else {
                    AdkError::Host("openAccessory threw")
                }));
            }
            Err(e) => return Err(e.into()),
        };
        if descriptor.is_null() {
            return Err(BridgeError::Adk(AdkError::DescriptorUnavailable));
        }

        let fd = match env.call_method(&descriptor, "detachFd", "()I", &[]) {
            Ok(value) => value.i()?,
            Err(JniError::JavaException) => {
                clear_exception_is(&mut env, SECURITY_EXCEPTION_CLASS)?;
                return Err(BridgeError::Adk(AdkError::DescriptorUnavailable));
            }
            Err(e) => return Err(e.into()),
        };
        if fd < 0 {
            return Err(BridgeError::Adk(AdkError::DescriptorUnavailable));
        }

        debug!("Accessory descriptor fd {}", fd);
        // SAFETY: detachFd transfers ownership of a valid open fd to us.
        let file = File::from(unsafe { OwnedFd::from_raw_fd(fd) });
        Ok(OwnedDescriptor::new(file))
    }
}

impl AccessoryHost for AndroidUsbHost {
    type Accessory = AndroidAccessory;
    type Descriptor = OwnedDescriptor;

    fn accessories(&self) -> AdkResult<Vec<AndroidAccessory>> {
        self.list().map_err(|e| e.into_adk("getAccessoryList"))
    }

    fn open_accessory(&self, accessory: &AndroidAccessory) -> AdkResult<OwnedDescriptor> {
        self.bind(accessory).map_err(|e| e.into_adk("openAccessory"))
    }
}

/// Clear the pending exception, reporting whether it is a `class`
fn clear_exception_is(env: &mut JNIEnv, class: &str) -> Result<bool, BridgeError> {
    let throwable = env.exception_occurred()?;
    env.exception_clear()?;
    if throwable.is_null() {
        return Ok(false);
    }
    let matches = env.is_instance_of(&throwable, class)?;
    if !matches {
        warn!("Java exception while talking to UsbManager");
    }
    Ok(matches)
}

/// Call a `()Ljava/lang/String;` getter, treating null and exceptions as absent
fn string_getter(
    env: &mut JNIEnv,
    object: &JObject,
    method: &str,
) -> Result<Option<String>, BridgeError> {
    let value = match env.call_method(object, method, "()Ljava/lang/String;", &[]) {
        Ok(value) => value.l()?,
        // getSerial requires permission on newer platforms
        Err(JniError::JavaException) => {
            clear_exception_is(env, SECURITY_EXCEPTION_CLASS)?;
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    if value.is_null() {
        return Ok(None);
    }
    let value = JString::from(value);
    let text: String = env.get_string(&value)?.into();
    env.delete_local_ref(value)?;
    Ok(Some(text))
}

/// Whether `object` is an `android.hardware.usb.UsbAccessory`
pub fn is_usb_accessory(env: &mut JNIEnv, object: &JObject) -> Result<bool, BridgeError> {
    if object.is_null() {
        return Ok(false);
    }
    Ok(env.is_instance_of(object, USB_ACCESSORY_CLASS)?)
}
