//! Text listing of a decoded module.
//!
//! Not a round-trippable WAT emitter: instructions are printed flat, one per
//! line, with indentation following `block`/`loop`/`if` nesting.

use super::decoder::{decode_instructions, DecodedModule, Operand};
use super::opcodes::{external, op};
use super::{FuncType, ValType};
use crate::Result;
use std::fmt::Write;

fn types(list: &[ValType]) -> String {
    list.iter().map(|t| t.name()).collect::<Vec<_>>().join(" ")
}

fn signature(ty: &FuncType) -> String {
    let mut s = String::new();
    if !ty.params.is_empty() {
        let _ = write!(s, " (param {})", types(&ty.params));
    }
    if !ty.results.is_empty() {
        let _ = write!(s, " (result {})", types(&ty.results));
    }
    s
}

fn escape(bytes: &[u8]) -> String {
    let mut s = String::new();
    for &b in bytes {
        if (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ' {
            s.push(b as char);
        } else {
            let _ = write!(s, "\\{:02x}", b);
        }
    }
    s
}

/// Render `module` as text
pub fn print_module(module: &DecodedModule) -> Result<String> {
    let mut out = String::from("(module\n");
    for (i, ty) in module.types.iter().enumerate() {
        let _ = writeln!(out, "  (type (;{};) (func{}))", i, signature(ty));
    }
    for (i, import) in module.imports.iter().enumerate() {
        let _ = writeln!(
            out,
            "  (import \"{}\" \"{}\" (func (;{};) (type {})))",
            import.module, import.field, i, import.type_index
        );
    }
    for (defined, body) in module.bodies.iter().enumerate() {
        let index = module.imports.len() + defined;
        let ty = module
            .functions
            .get(defined)
            .and_then(|t| module.types.get(*t as usize));
        let sig = ty.map(signature).unwrap_or_default();
        let _ = writeln!(out, "  (func (;{};){}", index, sig);
        if !body.locals.is_empty() {
            let _ = writeln!(out, "    (local {})", types(&body.locals));
        }
        let instrs = decode_instructions(&body.code, body.offset)?;
        let mut indent = 2usize;
        // The last `end` closes the function itself
        let count = instrs.len().saturating_sub(1);
        for instr in &instrs[..count] {
            if matches!(instr.opcode, op::END | op::ELSE) {
                indent = indent.saturating_sub(1);
            }
            let pad = "  ".repeat(indent);
            let operand = match instr.operand {
                Operand::None => String::new(),
                Operand::Block(None) => String::new(),
                Operand::Block(Some(t)) => format!(" (result {})", t.name()),
                Operand::Index(i) => format!(" {}", i),
                Operand::Mem { align, offset } => {
                    if offset == 0 {
                        format!(" align={}", 1u32 << align)
                    } else {
                        format!(" offset={} align={}", offset, 1u32 << align)
                    }
                }
                Operand::I32(v) => format!(" {}", v),
                Operand::I64(v) => format!(" {}", v),
                Operand::F32(v) => format!(" {:?}", v),
                Operand::F64(v) => format!(" {:?}", v),
            };
            let _ = writeln!(out, "{}{}{}", pad, instr.mnemonic(), operand);
            if matches!(instr.opcode, op::BLOCK | op::LOOP | op::IF | op::ELSE) {
                indent += 1;
            }
        }
        out.push_str("  )\n");
    }
    if let Some((min, max)) = module.memory {
        match max {
            Some(max) => {
                let _ = writeln!(out, "  (memory (;0;) {} {})", min, max);
            }
            None => {
                let _ = writeln!(out, "  (memory (;0;) {})", min);
            }
        }
    }
    for (i, global) in module.globals.iter().enumerate() {
        let ty = if global.mutable {
            format!("(mut {})", global.ty.name())
        } else {
            global.ty.name().to_string()
        };
        let _ = writeln!(out, "  (global (;{};) {} ({:?}))", i, ty, global.init);
    }
    for export in &module.exports {
        let kind = match export.kind {
            external::FUNC => "func",
            external::MEMORY => "memory",
            external::GLOBAL => "global",
            _ => "table",
        };
        let _ = writeln!(
            out,
            "  (export \"{}\" ({} {}))",
            export.name, kind, export.index
        );
    }
    for seg in &module.data {
        let _ = writeln!(
            out,
            "  (data (i32.const {}) \"{}\")",
            seg.offset,
            escape(&seg.bytes)
        );
    }
    out.push_str(")\n");
    Ok(out)
}

/// Decode `bytes` and render them as text
pub fn module_to_wat(bytes: &[u8]) -> Result<String> {
    let module = super::decode_module(bytes)?;
    print_module(&module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::wasm::{Assembler, BlockType};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nested_control_is_indented() {
        let mut asm = Assembler::new();
        let ty = asm.emit_function_type(&[ValType::I32], &[]);
        let f = asm.declare_function(ty, "f");
        asm.begin_function(f, &[]);
        asm.block(BlockType::Empty);
        asm.loop_(BlockType::Empty);
        asm.local_get(0);
        asm.br_if(1);
        asm.br(0);
        asm.end();
        asm.end();
        asm.end_function().unwrap();
        let text = module_to_wat(&asm.finish().unwrap()).unwrap();
        let expected = "\
(module
  (type (;0;) (func (param i32)))
  (func (;0;) (param i32)
    block
      loop
        local.get 0
        br_if 1
        br 0
      end
    end
  )
)
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_data_is_escaped() {
        assert_eq!(escape(b"a\nb"), "a\\0ab");
    }
}
