//! One Wasmtime instance with quotas and packed-record memory access.
//!
//! [`Sandbox`] owns a store, an instance, and the guest's exported linear
//! memory. The store can be built with a fuel meter (deterministic time
//! budget) and a memory ceiling; exceeding either traps the guest without
//! harming the host. Guest memory stays readable after any trap.

use wasmtime::{
    Caller, Engine, Instance, Linker, Memory, Module, Store, StoreLimits, StoreLimitsBuilder,
    TypedFunc, WasmParams, WasmResults,
};
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::WasiCtxBuilder;

use scubywasm_abi::WireRecord;

use crate::{classify_trap, HostError};

// Guests get one memory and one table; the element cap is far above what a
// compiled agent needs while still bounding a hostile module.
const MAX_TABLE_ELEMENTS: usize = 10_000;

// ---------------------------------------------------------------------------
// SandboxSpec
// ---------------------------------------------------------------------------

/// Store configuration for a [`Sandbox`].
#[derive(Debug, Clone, Default)]
pub struct SandboxSpec {
    /// Enable the fuel meter. Fuel APIs are only meaningful when set.
    pub fuel_metering: bool,

    /// Fuel available during instantiation and startup. Required when
    /// `fuel_metering` is on, otherwise startup runs on an empty tank and
    /// traps immediately.
    pub initial_fuel: Option<u64>,

    /// Linear memory ceiling in bytes. `None` leaves the store unlimited.
    pub memory_limit: Option<usize>,

    /// Supply a default WASI environment (no preopens, no inherited stdio).
    pub wasi: bool,
}

// ---------------------------------------------------------------------------
// Store state
// ---------------------------------------------------------------------------

/// Per-store state: the WASI context and the resource limiter.
struct SandboxState {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

/// An instantiated guest module plus its store.
///
/// Exposes typed export resolution, guarded export invocation, packed-record
/// reads/writes against guest memory, and fuel accounting.
pub struct Sandbox {
    store: Store<SandboxState>,
    instance: Instance,
    memory: Memory,
    fuel_metering: bool,
}

impl Sandbox {
    /// Compile and instantiate a guest module.
    ///
    /// The host function `debug.debug_log(ptr, len)` is always importable.
    /// If the module exports `_initialize` or `__wasm_call_ctors` (in that
    /// preference order), it is invoked before any other call.
    ///
    /// # Errors
    ///
    /// [`HostError::Compile`] for invalid bytes, [`HostError::Instantiation`]
    /// for link/instantiation failures (including a declared memory above the
    /// ceiling), [`HostError::MissingExport`] when the module exports no
    /// `memory`, and [`HostError::Trap`]/[`HostError::OutOfFuel`] when a
    /// startup function faults.
    pub fn new(wasm: &[u8], spec: SandboxSpec) -> Result<Self, HostError> {
        let mut engine_config = wasmtime::Config::new();
        engine_config.consume_fuel(spec.fuel_metering);

        let engine = Engine::new(&engine_config)
            .map_err(|e| HostError::Runtime(format!("failed to create Wasmtime engine: {e}")))?;

        let module = Module::new(&engine, wasm).map_err(|e| HostError::Compile(format!("{e}")))?;

        let mut linker: Linker<SandboxState> = Linker::new(&engine);
        if spec.wasi {
            wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, |state: &mut SandboxState| {
                &mut state.wasi
            })
            .map_err(|e| HostError::Runtime(format!("failed to link WASI: {e}")))?;
        }
        linker
            .func_wrap("debug", "debug_log", host_debug_log)
            .map_err(|e| HostError::Runtime(format!("failed to link debug_log: {e}")))?;

        let mut limits = StoreLimitsBuilder::new()
            .memories(1)
            .tables(1)
            .table_elements(MAX_TABLE_ELEMENTS)
            .instances(1);
        if let Some(bytes) = spec.memory_limit {
            limits = limits.memory_size(bytes);
        }

        let state = SandboxState {
            wasi: WasiCtxBuilder::new().build_p1(),
            limits: limits.build(),
        };

        let mut store = Store::new(&engine, state);
        store.limiter(|state| &mut state.limits);

        if spec.fuel_metering {
            let fuel = spec.initial_fuel.unwrap_or(0);
            store
                .set_fuel(fuel)
                .map_err(|e| HostError::Runtime(format!("failed to set fuel: {e}")))?;
        }

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| HostError::Instantiation(format!("{e}")))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| HostError::MissingExport {
                name: "memory".to_owned(),
            })?;

        let mut sandbox = Self {
            store,
            instance,
            memory,
            fuel_metering: spec.fuel_metering,
        };
        sandbox.run_startup()?;

        Ok(sandbox)
    }

    /// Invoke `_initialize` or `__wasm_call_ctors` if the module exports one.
    fn run_startup(&mut self) -> Result<(), HostError> {
        for name in ["_initialize", "__wasm_call_ctors"] {
            let Some(func) = self.instance.get_func(&mut self.store, name) else {
                continue;
            };
            let func = func
                .typed::<(), ()>(&self.store)
                .map_err(|e| HostError::Runtime(format!("startup export '{name}': {e}")))?;
            func.call(&mut self.store, ()).map_err(classify_trap)?;
            tracing::trace!(startup = name, "guest startup function ran");
            break;
        }
        Ok(())
    }

    /// Resolve a named export to a typed function handle.
    ///
    /// # Errors
    ///
    /// [`HostError::MissingExport`] when absent, [`HostError::Runtime`] when
    /// present with a different signature.
    pub fn typed_func<P, R>(&mut self, name: &str) -> Result<TypedFunc<P, R>, HostError>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = self
            .instance
            .get_func(&mut self.store, name)
            .ok_or_else(|| HostError::MissingExport {
                name: name.to_owned(),
            })?;
        func.typed::<P, R>(&self.store)
            .map_err(|e| HostError::Runtime(format!("export '{name}' has unexpected signature: {e}")))
    }

    /// Invoke a resolved export.
    ///
    /// A trap never corrupts the host; the store and guest memory remain
    /// usable (memory contents are undefined past the trap point).
    pub fn call<P, R>(&mut self, func: &TypedFunc<P, R>, params: P) -> Result<R, HostError>
    where
        P: WasmParams,
        R: WasmResults,
    {
        func.call(&mut self.store, params).map_err(classify_trap)
    }

    /// Read a packed record from guest memory at `ptr`.
    pub fn read_record<T: WireRecord>(&mut self, ptr: i32) -> Result<T, HostError> {
        let data = self.memory.data(&self.store);
        let range = self.record_range(ptr, T::SIZE, data.len())?;
        T::decode(&data[range]).map_err(|e| HostError::Runtime(e.to_string()))
    }

    /// Write a packed record into guest memory at `ptr`.
    pub fn write_record<T: WireRecord>(&mut self, ptr: i32, record: &T) -> Result<(), HostError> {
        let size = self.memory.data_size(&self.store);
        let range = self.record_range(ptr, T::SIZE, size)?;
        let data = self.memory.data_mut(&mut self.store);
        record
            .encode(&mut data[range])
            .map_err(|e| HostError::Runtime(e.to_string()))
    }

    fn record_range(
        &self,
        ptr: i32,
        len: usize,
        memory_size: usize,
    ) -> Result<std::ops::Range<usize>, HostError> {
        let start = usize::try_from(ptr).map_err(|_| HostError::MemoryAccess {
            ptr,
            len,
            size: memory_size,
        })?;
        let end = start.checked_add(len).filter(|&end| end <= memory_size).ok_or(
            HostError::MemoryAccess {
                ptr,
                len,
                size: memory_size,
            },
        )?;
        Ok(start..end)
    }

    /// Remaining fuel. Zero when the meter is disabled or drained.
    pub fn fuel(&self) -> u64 {
        self.store.get_fuel().unwrap_or(0)
    }

    /// Set the remaining fuel. Only valid on a fuel-metered store.
    pub fn set_fuel(&mut self, fuel: u64) -> Result<(), HostError> {
        self.store
            .set_fuel(fuel)
            .map_err(|e| HostError::Runtime(format!("failed to set fuel: {e}")))
    }

    /// Whether this store was built with fuel metering.
    pub fn fuel_metering(&self) -> bool {
        self.fuel_metering
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("fuel_metering", &self.fuel_metering)
            .field("fuel", &self.fuel())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Host functions
// ---------------------------------------------------------------------------

/// `debug.debug_log(ptr: i32, len: i32)`
///
/// Reads a UTF-8 slice from guest memory and forwards it to the log sink.
fn host_debug_log(mut caller: Caller<'_, SandboxState>, ptr: i32, len: i32) {
    match read_guest_string(&mut caller, ptr, len) {
        Ok(msg) => tracing::debug!(source = "guest", "{msg}"),
        Err(e) => tracing::warn!(error = %e, "debug_log: unreadable guest string"),
    }
}

/// Read a UTF-8 string from guest memory at `(ptr, len)`.
fn read_guest_string(
    caller: &mut Caller<'_, SandboxState>,
    ptr: i32,
    len: i32,
) -> Result<String, String> {
    let memory = caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or_else(|| "guest has no exported 'memory'".to_owned())?;

    let data = memory.data(&caller);
    if ptr < 0 || len < 0 {
        return Err(format!("negative ptr/len: ptr={ptr}, len={len}"));
    }
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            format!(
                "string read out of bounds: ptr={ptr}, len={len}, memory_size={}",
                data.len()
            )
        })?;

    String::from_utf8(data[start..end].to_vec())
        .map_err(|e| format!("string at ptr={ptr} len={len} is not valid UTF-8: {e}"))
}
