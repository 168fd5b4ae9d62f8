use std::io;

#[allow(dead_code)]
#[path = "../bench.rs"]
mod bench;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Cut)?;
    record_profile(TranscriptProfile::ArcLoss)?;
    record_profile(TranscriptProfile::Overrun)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    match profile {
        TranscriptProfile::Cut => record_cut(&mut session),
        TranscriptProfile::ArcLoss => record_arc_loss(&mut session),
        TranscriptProfile::Overrun => record_overrun(&mut session),
    }
}

fn record_cut(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("help start")?;
    let _ = session.handle_command("unlock")?;
    let _ = session.handle_command("start V=118 D=300 H=1.5 I=3.8")?;
    let _ = session.handle_command("run 500")?;
    let _ = session.handle_command("arc 112")?;
    let _ = session.handle_command("run 1500")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("stop after")?;
    let _ = session.handle_command("run 20")?;
    let _ = session.handle_command("stop")?;
    let _ = session.handle_command("run 300")?;
    let _ = session.handle_command("status")?;
    Ok(())
}

fn record_arc_loss(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("unlock")?;
    let _ = session.handle_command("start")?;
    let _ = session.handle_command("run 2000")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("lock")?;
    let _ = session.handle_command("start V=40")?;
    let _ = session.handle_command("unlock")?;
    let _ = session.handle_command("dryrun on")?;
    let _ = session.handle_command("start D=200")?;
    let _ = session.handle_command("run 400")?;
    let _ = session.handle_command("status")?;
    Ok(())
}

fn record_overrun(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("accel 100000")?;
    let _ = session.handle_command("unlock")?;
    let _ = session.handle_command("start")?;
    let _ = session.handle_command("run 400")?;
    let _ = session.handle_command("arc 60")?;
    let _ = session.handle_command("run 3000")?;
    let _ = session.handle_command("run 10")?;
    Ok(())
}
