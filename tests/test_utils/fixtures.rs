//! Test Fixtures
//!
//! Configuration tuned for the scripted console and canned console output.

use std::sync::Arc;

use consolepilot::{CommandDriver, Config, RequestSerializer};

use super::mock_console::MockLauncher;

pub const SESSIONS_TABLE: &str = "\
Active sessions
===============

  Id  Name  Type                     Information          Connection
  --  ----  ----                     -----------          ----------
  1         meterpreter x86/windows  NT AUTHORITY\\SYSTEM  10.0.0.1:4444 -> 10.0.0.2:49152 (10.0.0.2)
  2         shell linux              www-data             10.0.0.1:4445 -> 10.0.0.3:51000 (10.0.0.3)
";

pub const JOBS_TABLE: &str = "\
Jobs
====

  Id  Name                    Payload                          Payload opts
  --  ----                    -------                          ------------
  0   Exploit: multi/handler  windows/meterpreter/reverse_tcp  tcp://10.0.0.1:4444
";

pub const SEARCH_TABLE: &str = "\
Matching Modules
================

   #  Name                                      Disclosure Date  Rank     Check  Description
   -  ----                                      ---------------  ----     -----  -----------
   0  exploit/windows/smb/ms17_010_eternalblue  2017-03-14       average  Yes    MS17-010 EternalBlue SMB Remote Windows Kernel Pool Corruption
   1  auxiliary/scanner/smb/smb_ms17_010                         normal   No     MS17-010 SMB RCE Detection
   2  exploit/windows/smb/ms17_010_psexec       2017-03-14       normal   Yes    MS17-010 EternalRomance/EternalSynergy/EternalChampion SMB Remote Windows Code Execution
";

pub const SESSION_OPENED: &str =
    "[*] Meterpreter session 1 opened (10.0.0.1:4444 -> 10.0.0.2:49152) at 2024-05-01 10:00:00 +0000";

/// Create a test configuration with short process limits
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.supervisor.startup_timeout_secs = 5;
    config.supervisor.max_restarts = 3;
    config.supervisor.shutdown_grace_ms = 100;
    config.output.prompt_settle_ms = 200;
    config.registry.reap_interval_secs = 3600;
    config
}

/// A started driver on top of the scripted console
pub async fn start_driver(launcher: Arc<MockLauncher>, config: &Config) -> CommandDriver {
    let mut driver = CommandDriver::from_config(config, launcher).expect("valid test config");
    driver.start().await.expect("scripted console starts");
    driver
}

/// A started serializer on top of the scripted console
pub async fn start_serializer(launcher: Arc<MockLauncher>, config: &Config) -> RequestSerializer {
    RequestSerializer::from_config(config, launcher)
        .await
        .expect("scripted console starts")
}
