//! The disassemble request: `-data-disassemble` over the ranges around a
//! memory reference.
//!
//! The DAP asks for an exact instruction count at an instruction offset
//! that may be negative. Byte ranges are estimated with a per-instruction
//! allowance and the result is trimmed/padded to the requested count, with
//! a separate fetch for the negative and positive ranges.

use gdb_mi::MiTuple;

use crate::adapter::dap_types::{
    DisassembleArguments, DisassembleResponseBody, DisassembledInstruction, Request,
};
use crate::server::memory::parse_memory_reference;
use crate::server::session::{get_arguments, DebugSession};
use crate::DebuggerError;

/// Window allowance per requested instruction. Generous enough for
/// variable-length ISAs; fixed-width ISAs simply decode more than needed.
const BYTES_PER_INSTRUCTION: u64 = 8;

impl DebugSession {
    pub(crate) async fn disassemble(&self, request: &Request) -> anyhow::Result<()> {
        let arguments: DisassembleArguments = match get_arguments(request) {
            Ok(arguments) => arguments,
            Err(error) => return self.client.send_response::<()>(request, Err(&error)),
        };
        match self.build_disassembly(&arguments).await {
            Ok(instructions) => self
                .client
                .send_response(request, Ok(Some(DisassembleResponseBody { instructions }))),
            Err(error) => self.client.send_response::<()>(request, Err(&error)),
        }
    }

    async fn build_disassembly(
        &self,
        arguments: &DisassembleArguments,
    ) -> Result<Vec<DisassembledInstruction>, DebuggerError> {
        let base = parse_memory_reference(&arguments.memory_reference)?
            .wrapping_add_signed(arguments.offset.unwrap_or(0));
        let count = arguments.instruction_count.max(0) as u64;
        let instruction_offset = arguments.instruction_offset.unwrap_or(0);

        let mut instructions = Vec::new();

        // The instructions before the reference, newest last.
        if instruction_offset < 0 {
            let back = (instruction_offset.unsigned_abs()).min(count);
            let window_start = base.saturating_sub(back * BYTES_PER_INSTRUCTION);
            let mut fetched = self
                .fetch_instructions(window_start, base)
                .await
                .unwrap_or_default();
            if fetched.len() > back as usize {
                fetched.drain(..fetched.len() - back as usize);
            }
            while fetched.len() < back as usize {
                fetched.insert(0, unknown_instruction(window_start));
            }
            instructions.extend(fetched);
        }

        // The instructions at and after the reference.
        let skip = instruction_offset.max(0) as u64;
        let forward = count - instructions.len() as u64;
        if forward > 0 {
            let window_end = base
                .saturating_add((skip + forward) * BYTES_PER_INSTRUCTION)
                .max(base + 1);
            let fetched = self.fetch_instructions(base, window_end).await?;
            let mut fetched: Vec<DisassembledInstruction> = fetched
                .into_iter()
                .skip(skip as usize)
                .take(forward as usize)
                .collect();
            while (fetched.len() as u64) < forward {
                fetched.push(unknown_instruction(window_end));
            }
            instructions.extend(fetched);
        }

        Ok(instructions)
    }

    async fn fetch_instructions(
        &self,
        start: u64,
        end: u64,
    ) -> Result<Vec<DisassembledInstruction>, DebuggerError> {
        if start >= end {
            return Ok(Vec::new());
        }
        // Mode 2: disassembly with raw opcodes, no source interleaving.
        let results = self
            .backend
            .send(format!("-data-disassemble -s {start:#x} -e {end:#x} -- 2"))
            .await?;
        Ok(parse_disassembly(&results.results))
    }
}

fn unknown_instruction(address: u64) -> DisassembledInstruction {
    DisassembledInstruction {
        address: format!("{address:#x}"),
        instruction_bytes: None,
        instruction: "(bad)".to_string(),
        symbol: None,
    }
}

pub(crate) fn parse_disassembly(results: &MiTuple) -> Vec<DisassembledInstruction> {
    let Some(instructions) = results.list("asm_insns") else {
        return Vec::new();
    };
    instructions
        .iter()
        .filter_map(|entry| entry.as_tuple())
        .filter_map(|insn| {
            let address = insn.string("address")?.to_string();
            let symbol = match (insn.string("func-name"), insn.string("offset")) {
                (Some(func), Some(offset)) => Some(format!("{func}+{offset}")),
                (Some(func), None) => Some(func.to_string()),
                _ => None,
            };
            Some(DisassembledInstruction {
                address,
                instruction_bytes: insn.string("opcodes").map(str::to_string),
                instruction: insn.string("inst").unwrap_or_default().to_string(),
                symbol,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use gdb_mi::{MiParser, MiRecord};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn disassembly_parsing() {
        let line = r#"7^done,asm_insns=[{address="0x1149",func-name="main",offset="0",opcodes="55",inst="push   %rbp"},{address="0x114a",func-name="main",offset="1",opcodes="48 89 e5",inst="mov    %rsp,%rbp"}]"#;
        let MiRecord::Result(record) = MiParser::new().parse_line(line.as_bytes()) else {
            panic!("expected result record");
        };
        let instructions = parse_disassembly(&record.results);
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].address, "0x1149");
        assert_eq!(instructions[0].symbol.as_deref(), Some("main+0"));
        assert_eq!(instructions[1].instruction_bytes.as_deref(), Some("48 89 e5"));
        assert_eq!(instructions[1].instruction, "mov    %rsp,%rbp");
    }
}
