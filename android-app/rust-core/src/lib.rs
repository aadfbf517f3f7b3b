//! # Android JNI ADK Bridge
//!
//! This library exposes the ADK connection manager to the Android app.
//! It handles:
//!
//! - Looking up accessories through `UsbManager`
//! - Opening the accessory descriptor and wrapping it as a stream pair
//! - Blocking read/write on behalf of Kotlin/Java callers
//! - Closing on `USB_ACCESSORY_DETACHED` broadcasts
//!
//! ## JNI Bridge Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    Android App (Kotlin)                    │
//! │                                                            │
//! │  ┌──────────────┐   registerReceiver(detachedAction())     │
//! │  │   Activity   │──────────────────────────┐               │
//! │  └──────────────┘                          │               │
//! │         │ JNI Calls                        │ onReceive     │
//! │         ▼                                  ▼               │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │               adktoolkit_jni (this lib)              │  │
//! │  │  ┌──────────────┐   ┌─────────────┐   ┌──────────┐   │  │
//! │  │  │  AdkManager  │──►│ UsbManager  │──►│  fd I/O  │   │  │
//! │  │  │ (adktoolkit) │   │   (JNI)     │   │          │   │  │
//! │  │  └──────────────┘   └─────────────┘   └──────────┘   │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## JNI Functions Exported
//!
//! All on `me.palazzetti.adktoolkit.AdkBridge`:
//!
//! - `init(usbManager, configJson)`: create the manager
//! - `open()` / `openWithStatus()`: bind the first attached accessory
//! - `close()`, `isOpen()`, `serialAvailable()`
//! - `read()`: next chunk, `null` at end of stream, throws `IOException`
//! - `write(byte[])`, `writeByte`, `writeInt`, `writeFloat`, `writeText`
//! - `detachedAction()` / `onReceive(action, accessory)`: detachment hook
//! - `getStats()`: manager status as JSON

use std::sync::{Mutex, Once, PoisonError};

use adktoolkit::{AdkError, AdkManager, AdkMessage};
use jni::objects::{JByteArray, JClass, JObject, JString};
use jni::sys::{jboolean, jbyte, jbyteArray, jfloat, jint, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use log::{debug, error, info, warn};
use thiserror::Error;

pub mod config;
pub mod host;

use config::BridgeConfig;
use host::{is_usb_accessory, AndroidAccessory, AndroidUsbHost};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Returned by `openWithStatus` when `init` has not run
const STATUS_NOT_INITIALIZED: jint = -1;

/// Errors that can occur in the JNI bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge not initialized")]
    NotInitialized,
    #[error("JNI error: {0}")]
    Jni(#[from] jni::errors::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Adk(#[from] AdkError),
}

impl BridgeError {
    /// Collapse into the manager's error type, logging what gets lost
    pub fn into_adk(self, context: &'static str) -> AdkError {
        match self {
            BridgeError::Adk(e) => e,
            other => {
                error!("{} failed: {}", context, other);
                AdkError::Host(context)
            }
        }
    }
}

type BridgeManager = AdkManager<AndroidUsbHost>;

lazy_static::lazy_static! {
    static ref MANAGER: Mutex<Option<BridgeManager>> = Mutex::new(None);
}

/// Clone of the installed manager; the global lock is not held across I/O
fn manager() -> Option<BridgeManager> {
    MANAGER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn with_manager<T>(name: &str, fallback: T, f: impl FnOnce(&BridgeManager) -> T) -> T {
    match manager() {
        Some(manager) => f(&manager),
        None => {
            warn!("{} called before init", name);
            fallback
        }
    }
}

fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

fn init_logger(config: &BridgeConfig) {
    INIT_LOGGER.call_once(|| {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(config.level_filter())
                .with_tag(config.log_tag.as_str()),
        );
    });
}

fn install(
    env: &mut JNIEnv,
    usb_manager: &JObject,
    config_json: &JString,
) -> Result<(), BridgeError> {
    let config = if config_json.is_null() {
        BridgeConfig::default()
    } else {
        let json: String = env.get_string(config_json)?.into();
        BridgeConfig::from_json(&json)?
    };
    init_logger(&config);

    let host = if usb_manager.is_null() {
        context_host()?
    } else {
        AndroidUsbHost::from_usb_manager(env, usb_manager)?
    };

    let manager = AdkManager::with_config(host, config.manager_config());
    let previous = MANAGER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(manager);
    if let Some(previous) = previous {
        info!("Replacing previous manager");
        previous.close();
    }
    Ok(())
}

#[cfg(target_os = "android")]
fn context_host() -> Result<AndroidUsbHost, BridgeError> {
    AndroidUsbHost::from_process_context()
}

#[cfg(not(target_os = "android"))]
fn context_host() -> Result<AndroidUsbHost, BridgeError> {
    Err(BridgeError::Adk(AdkError::Host("UsbManager is null")))
}

fn throw(env: &mut JNIEnv, class: &str, message: &str) {
    if let Err(e) = env.throw_new(class, message) {
        error!("Failed to throw {}: {:?}", class, e);
    }
}

/// Initialize the native ADK manager
///
/// `usbManager` may be null on Android, in which case the manager is looked
/// up through the application context.
///
/// Called from Kotlin:
/// ```kotlin
/// external fun init(usbManager: UsbManager?, configJson: String?): Boolean
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_init(
    mut env: JNIEnv,
    _class: JClass,
    usb_manager: JObject,
    config_json: JString,
) -> jboolean {
    match install(&mut env, &usb_manager, &config_json) {
        Ok(()) => {
            info!("ADK bridge initialized, version {}", adktoolkit::VERSION);
            JNI_TRUE
        }
        Err(e) => {
            error!("ADK bridge init failed: {}", e);
            JNI_FALSE
        }
    }
}

/// Open the first attached accessory
///
/// ```kotlin
/// external fun open(): Boolean
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_open(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    with_manager("open", JNI_FALSE, |m| to_jboolean(m.open()))
}

/// Open the first attached accessory, returning `0` or an error code
///
/// ```kotlin
/// external fun openWithStatus(): Int
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_openWithStatus(
    _env: JNIEnv,
    _class: JClass,
) -> jint {
    with_manager("openWithStatus", STATUS_NOT_INITIALIZED, |m| {
        match m.try_open() {
            Ok(()) => 0,
            Err(e) => {
                debug!("openWithStatus: {}", e);
                e.code()
            }
        }
    })
}

/// ```kotlin
/// external fun close()
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_close(
    _env: JNIEnv,
    _class: JClass,
) {
    with_manager("close", (), |m| m.close())
}

/// ```kotlin
/// external fun isOpen(): Boolean
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_isOpen(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    with_manager("isOpen", JNI_FALSE, |m| to_jboolean(m.is_open()))
}

/// ```kotlin
/// external fun serialAvailable(): Boolean
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_serialAvailable(
    _env: JNIEnv,
    _class: JClass,
) -> jboolean {
    with_manager("serialAvailable", JNI_FALSE, |m| {
        to_jboolean(m.serial_available())
    })
}

/// Blocking read of the next chunk
///
/// Returns `null` at end of stream and throws `IOException` on failure.
///
/// ```kotlin
/// @Throws(IOException::class)
/// external fun read(): ByteArray?
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_read(
    mut env: JNIEnv,
    _class: JClass,
) -> jbyteArray {
    let Some(manager) = manager() else {
        let message = BridgeError::NotInitialized.to_string();
        throw(&mut env, "java/lang/IllegalStateException", &message);
        return std::ptr::null_mut();
    };

    let read = manager.read();
    match bridge_read(read, |bytes| env.byte_array_from_slice(bytes)) {
        ReadOutcome::Chunk(array) => array.into_raw(),
        ReadOutcome::EndOfStream => std::ptr::null_mut(),
        ReadOutcome::Failed(reason) => {
            throw(&mut env, "java/io/IOException", &reason);
            std::ptr::null_mut()
        }
    }
}

/// What `read` hands back to Java
#[derive(Debug, PartialEq)]
enum ReadOutcome<T> {
    Chunk(T),
    /// Returned as `null`
    EndOfStream,
    /// Thrown as `IOException`
    Failed(String),
}

/// Convert a manager read into its Java form
///
/// Only end of stream becomes `null`; a failure to build the array is an
/// I/O failure like any other.
fn bridge_read<T>(
    read: Result<AdkMessage, AdkError>,
    to_array: impl FnOnce(&[u8]) -> Result<T, jni::errors::Error>,
) -> ReadOutcome<T> {
    let message = match read {
        Ok(message) => message,
        Err(e) => return ReadOutcome::Failed(e.to_string()),
    };
    let Some(bytes) = message.bytes() else {
        return ReadOutcome::EndOfStream;
    };
    match to_array(bytes) {
        Ok(array) => ReadOutcome::Chunk(array),
        Err(e) => {
            error!("Failed to create byte array: {:?}", e);
            ReadOutcome::Failed(BridgeError::Jni(e).to_string())
        }
    }
}

/// ```kotlin
/// external fun write(data: ByteArray)
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_write(
    env: JNIEnv,
    _class: JClass,
    data: JByteArray,
) {
    let bytes = match env.convert_byte_array(&data) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to copy byte array: {:?}", e);
            return;
        }
    };
    with_manager("write", (), |m| m.write_bytes(&bytes))
}

/// ```kotlin
/// external fun writeByte(value: Byte)
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_writeByte(
    _env: JNIEnv,
    _class: JClass,
    value: jbyte,
) {
    with_manager("writeByte", (), |m| m.write_byte(value as u8))
}

/// ```kotlin
/// external fun writeInt(value: Int)
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_writeInt(
    _env: JNIEnv,
    _class: JClass,
    value: jint,
) {
    with_manager("writeInt", (), |m| m.write_int(value))
}

/// ```kotlin
/// external fun writeFloat(value: Float)
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_writeFloat(
    _env: JNIEnv,
    _class: JClass,
    value: jfloat,
) {
    with_manager("writeFloat", (), |m| m.write_float(value))
}

/// ```kotlin
/// external fun writeText(text: String)
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_writeText(
    mut env: JNIEnv,
    _class: JClass,
    text: JString,
) {
    let text: String = match env.get_string(&text) {
        Ok(s) => s.into(),
        Err(e) => {
            error!("Failed to get text string: {:?}", e);
            return;
        }
    };
    with_manager("writeText", (), |m| m.write_text(&text))
}

/// Broadcast action to register the detachment receiver for
///
/// ```kotlin
/// external fun detachedAction(): String
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_detachedAction(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let action = manager()
        .map(|m| m.detached_filter().action().to_string())
        .unwrap_or_else(|| adktoolkit::ACTION_USB_ACCESSORY_DETACHED.to_string());

    match env.new_string(&action) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            error!("Failed to create action string: {:?}", e);
            std::ptr::null_mut()
        }
    }
}

/// Forward a broadcast from the app's `BroadcastReceiver`
///
/// Closes the connection iff `action` is the detached action and
/// `accessory` is the bound accessory. Returns whether it closed.
///
/// ```kotlin
/// external fun onReceive(action: String, accessory: UsbAccessory?): Boolean
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_onReceive(
    mut env: JNIEnv,
    _class: JClass,
    action: JString,
    accessory: JObject,
) -> jboolean {
    let Some(manager) = manager() else {
        return JNI_FALSE;
    };

    let action: String = match env.get_string(&action) {
        Ok(s) => s.into(),
        Err(e) => {
            error!("Failed to get action string: {:?}", e);
            return JNI_FALSE;
        }
    };

    let accessory = match is_usb_accessory(&mut env, &accessory) {
        Ok(true) => match AndroidAccessory::from_object(&mut env, &accessory) {
            Ok(accessory) => Some(accessory),
            Err(e) => {
                warn!("Unreadable accessory in broadcast: {}", e);
                None
            }
        },
        Ok(false) => None,
        Err(e) => {
            warn!("Failed to inspect broadcast accessory: {}", e);
            None
        }
    };

    let listener = manager.detach_listener();
    to_jboolean(listener.on_receive(&action, accessory.as_ref()))
}

/// Manager status as JSON
///
/// ```kotlin
/// external fun getStats(): String
/// ```
#[no_mangle]
pub extern "system" fn Java_me_palazzetti_adktoolkit_AdkBridge_getStats(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let stats_json = match manager() {
        Some(m) => match serde_json::to_string(&m.status()) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize status: {}", e);
                return std::ptr::null_mut();
            }
        },
        None => r#"{"state":"uninitialized"}"#.to_string(),
    };

    match env.new_string(&stats_json) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            error!("Failed to create stats string: {:?}", e);
            std::ptr::null_mut()
        }
    }
}
