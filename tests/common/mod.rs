//! Shared helpers for the integration tests: a stub WASI host and a few
//! program builders.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Context};
use asrwasm::compiler::runtime::HOST_MODULE;
use asrwasm::{Asr, CompileOptions, CompileResult, Compiler};
use wasmtime::{Caller, Engine, Extern, Linker, Module, Store};

/// What the module did while it ran
#[derive(Debug, Default)]
pub struct HostState {
    pub stdout: Vec<u8>,
    pub exit_code: Option<i32>,
    pub writes: usize,
}

impl HostState {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Compile with default options, panicking with the diagnostics on failure
pub fn compile_ok(asr: &mut Asr) -> CompileResult {
    let result = Compiler::new(CompileOptions::default()).compile(asr);
    assert!(
        result.is_success(),
        "compilation failed: {:?}\n{}",
        result.error,
        result.diagnostics.to_json()
    );
    result
}

fn read_u32(data: &[u8], at: usize) -> anyhow::Result<u32> {
    let bytes = data
        .get(at..at + 4)
        .ok_or_else(|| anyhow!("read past end of memory at {at}"))?;
    Ok(u32::from_le_bytes(bytes.try_into()?))
}

/// Instantiate `bytes` against the stub host and run `_start`.
///
/// `proc_exit` traps to unwind the guest; a run that ends that way is a
/// normal termination and only the recorded exit code matters.
pub fn run_module(bytes: &[u8]) -> anyhow::Result<HostState> {
    let engine = Engine::default();
    let module = Module::new(&engine, bytes).context("module rejected by wasmtime")?;
    let mut linker: Linker<HostState> = Linker::new(&engine);

    linker.func_wrap(
        HOST_MODULE,
        "proc_exit",
        |mut caller: Caller<'_, HostState>, code: i32| -> anyhow::Result<()> {
            caller.data_mut().exit_code = Some(code);
            bail!("proc_exit({code})")
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        "fd_write",
        |mut caller: Caller<'_, HostState>,
         fd: i32,
         iovs: i32,
         iovs_len: i32,
         nwritten: i32|
         -> anyhow::Result<i32> {
            let memory = caller
                .get_export("memory")
                .and_then(Extern::into_memory)
                .ok_or_else(|| anyhow!("module exports no memory"))?;

            let mut chunk = Vec::new();
            {
                let data = memory.data(&caller);
                for i in 0..iovs_len as usize {
                    let iov = iovs as usize + i * 8;
                    let ptr = read_u32(data, iov)? as usize;
                    let len = read_u32(data, iov + 4)? as usize;
                    let bytes = data
                        .get(ptr..ptr + len)
                        .ok_or_else(|| anyhow!("iovec {ptr}+{len} out of bounds"))?;
                    chunk.extend_from_slice(bytes);
                }
            }

            let written = (chunk.len() as u32).to_le_bytes();
            let at = nwritten as usize;
            memory.data_mut(&mut caller)[at..at + 4].copy_from_slice(&written);

            if fd != 1 {
                bail!("write to unexpected fd {fd}");
            }
            let state = caller.data_mut();
            state.stdout.extend_from_slice(&chunk);
            state.writes += 1;
            Ok(0)
        },
    )?;

    let mut store = Store::new(&engine, HostState::default());
    let instance = linker.instantiate(&mut store, &module)?;
    let start = instance.get_typed_func::<(), ()>(&mut store, "_start")?;
    let outcome = start.call(&mut store, ());

    let state = store.into_data();
    match (outcome, state.exit_code) {
        (_, Some(_)) | (Ok(()), None) => Ok(state),
        (Err(trap), None) => Err(trap.context("guest trapped before exiting")),
    }
}

/// Compile and run, returning what the program printed
pub fn run_program(asr: &mut Asr) -> HostState {
    let result = compile_ok(asr);
    let bytes = result.bytes.expect("successful compilation carries bytes");
    run_module(&bytes).expect("module should run to completion")
}
