//! 交互命令解析

use access_trait::AccessWidth;

use crate::error::DevmemError;
use crate::pci::PciAddress;

/// 生成动词枚举：文本（可有别名）、参数说明、帮助信息
macro_rules! gen_verbs {
    ($name:ident {
        $($variant:ident = ([$($text:literal),+], $args:literal, $help:literal)),*,
    }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),*
        }

        impl $name {
            /// 按文本查找动词
            pub fn lookup(s: &str) -> Option<Self> {
                match s {
                    $($($text)|+ => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// 由同一张表生成的帮助信息
            pub fn help_msg() -> &'static str {
                concat!("Commands:\n", $(
                    "  ", $($text, " ",)+ $args, "\n      ", $help, "\n"
                ),*)
            }
        }
    };
}

gen_verbs! {
    Verb {
        Use = (["use"], "mem | pci <[dddd:]bb:ss.f> bar <n>", "select /dev/mem or a PCI device BAR for access"),
        Read = (["x"], "[/8|/16|/32|/64] <addr> [count]", "read count units from hex addr (default 32-bit, 1 unit)"),
        Write = (["w"], "[/8|/16|/32|/64] <addr> <value>", "write one unit at hex addr and read it back"),
        Help = (["help", "?"], "", "show this message"),
        Quit = (["quit", "exit"], "", "close all mappings and leave"),
    }
}

/// 一行输入解析后的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SelectLocal,
    SelectPci { address: PciAddress, bar: u8 },
    Read { address: u64, width: AccessWidth, count: usize },
    Write { address: u64, width: AccessWidth, value: u64 },
    Help,
    Quit,
}

/// 省略位宽/数量时的默认值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDefaults {
    pub width: AccessWidth,
    pub count: usize,
}

impl Default for CommandDefaults {
    fn default() -> Self {
        Self { width: AccessWidth::W32, count: 1 }
    }
}

impl Command {
    /// 解析一行输入，空行返回 `None`
    pub fn parse(line: &str, defaults: &CommandDefaults) -> Result<Option<Command>, DevmemError> {
        let mut tokens = line.split_whitespace();
        let Some(head) = tokens.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = tokens.collect();

        let (verb_text, suffix) = match head.split_once('/') {
            Some((verb, suffix)) => (verb, Some(suffix)),
            None => (head, None),
        };
        let verb = Verb::lookup(verb_text).ok_or_else(|| DevmemError::UnknownCommand(head.to_string()))?;

        let command = match verb {
            Verb::Read | Verb::Write => {
                let width = match suffix {
                    Some(suffix) => parse_width(suffix)?,
                    None => defaults.width,
                };
                parse_access(verb, width, &args, defaults)?
            }
            _ if suffix.is_some() => return Err(DevmemError::UnknownCommand(head.to_string())),
            Verb::Use => parse_use(&args)?,
            Verb::Help => Command::Help,
            Verb::Quit => Command::Quit,
        };
        Ok(Some(command))
    }
}

fn parse_use(args: &[&str]) -> Result<Command, DevmemError> {
    match args {
        [] => Err(DevmemError::usage("choose mem or pci")),
        ["mem"] => Ok(Command::SelectLocal),
        ["pci", device, "bar", bar] => {
            let address = device.parse::<PciAddress>()?;
            let bar = unsigned(bar)
                .and_then(|b| b.parse::<u8>().ok())
                .ok_or_else(|| DevmemError::parse("BAR index", bar))?;
            Ok(Command::SelectPci { address, bar })
        }
        ["pci", ..] => Err(DevmemError::usage("usage: use pci <[dddd:]bb:ss.f> bar <n>")),
        ["mem", ..] => Err(DevmemError::usage("usage: use mem")),
        [other, ..] => Err(DevmemError::usage(format!("unsupported backend '{}', choose mem or pci", other))),
    }
}

fn parse_access(
    verb: Verb,
    width: AccessWidth,
    args: &[&str],
    defaults: &CommandDefaults,
) -> Result<Command, DevmemError> {
    let Some((addr, rest)) = args.split_first() else {
        return Err(DevmemError::usage("need an address at least"));
    };
    let address = parse_hex_address(addr)?;

    match (verb, rest) {
        (Verb::Read, []) => Ok(Command::Read { address, width, count: defaults.count }),
        (Verb::Read, [count]) => Ok(Command::Read { address, width, count: parse_count(count)? }),
        (Verb::Write, []) => Err(DevmemError::usage("need a value to write")),
        (Verb::Write, [value]) => Ok(Command::Write { address, width, value: parse_value(value, width)? }),
        _ => Err(DevmemError::usage("too many arguments")),
    }
}

/// `8|16|32|64`
pub fn parse_width(token: &str) -> Result<AccessWidth, DevmemError> {
    unsigned(token)
        .and_then(|t| t.parse::<u32>().ok())
        .and_then(|bits| AccessWidth::try_from(bits).ok())
        .ok_or_else(|| DevmemError::InvalidWidth(token.to_string()))
}

/// 十六进制地址，`0x` 前缀可选
pub fn parse_hex_address(token: &str) -> Result<u64, DevmemError> {
    unsigned(strip_hex_prefix(token).unwrap_or(token))
        .and_then(|digits| u64::from_str_radix(digits, 16).ok())
        .ok_or_else(|| DevmemError::parse("address", token))
}

/// 带 `0x` 前缀按十六进制，否则按十进制
pub fn parse_number(token: &str, what: &'static str) -> Result<u64, DevmemError> {
    match strip_hex_prefix(token) {
        Some(hex) => unsigned(hex).and_then(|hex| u64::from_str_radix(hex, 16).ok()),
        None => unsigned(token).and_then(|dec| dec.parse::<u64>().ok()),
    }
    .ok_or_else(|| DevmemError::parse(what, token))
}

/// 要写入的值，必须能放进 `width`
pub fn parse_value(token: &str, width: AccessWidth) -> Result<u64, DevmemError> {
    let value = parse_number(token, "value")?;
    if !width.fits(value) {
        return Err(DevmemError::usage(format!(
            "value {} does not fit in {} bits",
            token, width
        )));
    }
    Ok(value)
}

/// 十进制的单元个数，至少为 1
pub fn parse_count(token: &str) -> Result<usize, DevmemError> {
    match unsigned(token).map(str::parse::<usize>) {
        Some(Ok(0)) => Err(DevmemError::usage("count must be at least 1")),
        Some(Ok(count)) => Ok(count),
        _ => Err(DevmemError::parse("count", token)),
    }
}

fn strip_hex_prefix(token: &str) -> Option<&str> {
    token.strip_prefix("0x").or_else(|| token.strip_prefix("0X"))
}

/// 标准库的整数解析接受前导 `+`，这里不接受
pub(crate) fn unsigned(token: &str) -> Option<&str> {
    (!token.starts_with('+')).then_some(token)
}
