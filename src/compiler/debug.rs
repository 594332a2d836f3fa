//! Debug utilities for ASR→WebAssembly compilation
//!
//! Tools for inspecting emitted modules: a hexdump, a per-function
//! disassembly with byte columns, and a full compilation report.

use super::wasm::decoder::Operand;
use super::wasm::opcodes::section;
use super::wasm::{decode_instructions, decode_module, wat, Instr};
use super::{CompileOptions, Compiler};
use crate::asr::Asr;
use anyhow::{Context, Result};
use std::fmt::Write as _;

const RULE: &str = "═══════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────";

/// Classic 16-bytes-per-line hexdump
pub fn hexdump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let hex = hex::encode(chunk);
        let spaced: Vec<&str> = (0..chunk.len()).map(|i| &hex[i * 2..i * 2 + 2]).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let _ = writeln!(out, "{:08x}  {:<47}  |{}|", line * 16, spaced.join(" "), ascii);
    }
    out
}

/// Format a single decoded instruction
pub fn format_instr(instr: &Instr) -> String {
    match instr.operand {
        Operand::None => instr.mnemonic().to_string(),
        Operand::Block(None) => instr.mnemonic().to_string(),
        Operand::Block(Some(ty)) => format!("{} (result {})", instr.mnemonic(), ty.name()),
        Operand::Index(i) => format!("{} {}", instr.mnemonic(), i),
        Operand::Mem { align, offset } => {
            format!("{} offset={} align={}", instr.mnemonic(), offset, 1u32 << align)
        }
        Operand::I32(v) => format!("{} {}", instr.mnemonic(), v),
        Operand::I64(v) => format!("{} {}", instr.mnemonic(), v),
        Operand::F32(v) => format!("{} {:?}", instr.mnemonic(), v),
        Operand::F64(v) => format!("{} {:?}", instr.mnemonic(), v),
    }
}

/// Disassemble every function body with its raw bytes
pub fn disassemble(bytes: &[u8]) -> Result<String> {
    let module = decode_module(bytes).context("decoding module for disassembly")?;
    let mut out = String::new();
    writeln!(out, "{}", RULE)?;
    writeln!(out, "                  WASM DISASSEMBLY")?;
    writeln!(out, "{}", RULE)?;
    let sections: Vec<&str> = module.section_order.iter().map(|&id| section::name(id)).collect();
    writeln!(out, "Sections: {}", sections.join(", "))?;
    for (i, import) in module.imports.iter().enumerate() {
        writeln!(out, "import {}: {}.{}", i, import.module, import.field)?;
    }

    for (defined, body) in module.bodies.iter().enumerate() {
        let index = module.imports.len() + defined;
        writeln!(out, "{}", THIN_RULE)?;
        let name = module
            .exports
            .iter()
            .find(|e| e.index as usize == index && e.kind == 0)
            .map(|e| e.name.as_str())
            .unwrap_or("");
        writeln!(out, "func {} {} locals={:?}", index, name, body.locals)?;
        writeln!(out, "  OFFSET │ BYTES                      │ INSTRUCTION")?;

        let instrs = decode_instructions(&body.code, body.offset)
            .with_context(|| format!("decoding body of function {}", index))?;
        let mut depth = 0usize;
        for (i, instr) in instrs.iter().enumerate() {
            let end = instrs.get(i + 1).map_or(body.offset + body.code.len(), |n| n.offset);
            let raw = &body.code[instr.offset - body.offset..end - body.offset];
            if matches!(instr.mnemonic(), "end" | "else") {
                depth = depth.saturating_sub(1);
            }
            writeln!(
                out,
                "{:08x}│ {:<26} │ {}{}",
                instr.offset,
                truncate_hex(raw),
                "  ".repeat(depth),
                format_instr(instr)
            )?;
            if matches!(instr.mnemonic(), "block" | "loop" | "if" | "else") {
                depth += 1;
            }
        }
    }
    writeln!(out, "{}", RULE)?;
    Ok(out)
}

/// Hex bytes of one instruction, shortened to fit the column
fn truncate_hex(raw: &[u8]) -> String {
    let hex = hex::encode(raw);
    if hex.len() > 26 {
        format!("{}..", &hex[..24])
    } else {
        hex
    }
}

/// Compile `asr` and describe everything that happened
pub fn debug_report(asr: &mut Asr, options: CompileOptions) -> Result<String> {
    let result = Compiler::new(options).compile(asr);
    let mut out = String::new();
    writeln!(out, "╔═════════════════════════════════════════════════════════════╗")?;
    writeln!(out, "║              ASR→WASM COMPILATION DEBUG                     ║")?;
    writeln!(out, "╚═════════════════════════════════════════════════════════════╝")?;

    match &result.bytes {
        Some(bytes) => {
            writeln!(out, "  Status:        SUCCESS")?;
            writeln!(out, "  Module size:   {} bytes", bytes.len())?;
            let helpers: Vec<&str> = result.helpers.iter().map(|h| h.name()).collect();
            writeln!(out, "  Helpers:       [{}]", helpers.join(", "))?;
            if let Some(verify) = &result.verification {
                writeln!(
                    out,
                    "  Verification:  {} ({} instructions, {} calls)",
                    if verify.valid { "VALID" } else { "INVALID" },
                    verify.stats.instruction_count,
                    verify.stats.call_count
                )?;
            }
        }
        None => writeln!(out, "  Status:        FAILED")?,
    }
    for diagnostic in result.diagnostics.iter() {
        writeln!(out, "  {}", diagnostic)?;
    }
    if let Some(report) = &result.time_report {
        for pass in &report.passes {
            writeln!(out, "  pass {:<20} {:?}", pass.name, pass.elapsed)?;
        }
        writeln!(out, "  codegen {:?}  verify {:?}  total {:?}", report.codegen, report.verify, report.total)?;
    }

    if let Some(bytes) = &result.bytes {
        out.push('\n');
        out.push_str(&disassemble(bytes)?);
        out.push('\n');
        out.push_str(&wat::module_to_wat(bytes).context("rendering text format")?);
    }
    Ok(out)
}

/// Print [`debug_report`] to stdout
pub fn debug_compile(asr: &mut Asr, options: CompileOptions) {
    match debug_report(asr, options) {
        Ok(report) => println!("{}", report),
        Err(e) => println!("debug report failed: {:#}", e),
    }
}
